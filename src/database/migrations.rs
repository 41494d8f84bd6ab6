pub use sea_orm_migration::prelude::*;

mod m20250601_090000_create_script;
mod m20250601_090500_create_script_run;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_090000_create_script::Migration),
            Box::new(m20250601_090500_create_script_run::Migration),
        ]
    }
}

pub struct Migrator;
