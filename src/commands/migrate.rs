use std::process;

use sea_orm::{DatabaseConnection, DbErr};
use sea_orm_migration::{Migration, MigratorTrait};

use crate::{
    cli::MigrateAction, config::Config, database::migrations::Migrator,
    database::setup_database_connection,
};

pub async fn handle_migrate_command(config: &Config, action: MigrateAction) {
    let db = setup_database_connection(&config.database).await;

    if let Err(e) = run_migration_action(&db, action).await {
        eprintln!("❌ Migration failed: {e}");
        process::exit(1);
    }
}

pub async fn run_migration_action(
    db: &DatabaseConnection,
    action: MigrateAction,
) -> Result<(), DbErr> {
    match action {
        MigrateAction::Up { steps } => {
            let pending = Migrator::get_pending_migrations(db).await?;
            if pending.is_empty() {
                println!("✅ All migrations are already up to date");
                return Ok(());
            }

            let count = steps.map_or(pending.len(), |steps| (steps as usize).min(pending.len()));
            print_plan("Applying", &pending[..count]);

            Migrator::up(db, steps).await?;
            println!("✅ Migrations completed successfully");
        }
        MigrateAction::Down { steps } => {
            let applied = Migrator::get_applied_migrations(db).await?;
            if applied.is_empty() {
                println!("❌ No migrations to roll back");
                return Ok(());
            }

            print_plan("Rolling back", newest(&applied, steps));

            Migrator::down(db, Some(steps)).await?;
            println!("✅ Rollback completed successfully");
        }
        MigrateAction::Status => {
            for migration in Migrator::get_applied_migrations(db).await? {
                println!("  ✓ {}", migration.name());
            }
            for migration in Migrator::get_pending_migrations(db).await? {
                println!("  - {} (pending)", migration.name());
            }
        }
        MigrateAction::Reset => {
            println!("🔄 Resetting database (this will drop all data!)...");

            Migrator::refresh(db).await?;
            println!("✅ Database reset completed successfully");
        }
        MigrateAction::Reapply { steps } => {
            let applied = Migrator::get_applied_migrations(db).await?;
            if applied.is_empty() {
                println!("❌ No migrations to reapply");
                return Ok(());
            }

            let reapplied = newest(&applied, steps);
            print_plan("Reapplying", reapplied);
            let steps = u32::try_from(reapplied.len()).unwrap_or(steps);

            Migrator::down(db, Some(steps)).await?;
            Migrator::up(db, Some(steps)).await?;
            println!("✅ Reapply completed successfully");
        }
    }

    Ok(())
}

/// The `steps` most recently applied migrations, oldest first.
fn newest(applied: &[Migration], steps: u32) -> &[Migration] {
    let count = (steps as usize).min(applied.len());
    &applied[applied.len() - count..]
}

fn print_plan(verb: &str, migrations: &[Migration]) {
    println!("{verb} {} migration(s):", migrations.len());
    for migration in migrations {
        println!("  📄 {}", migration.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::setup_test::test_database;

    #[tokio::test]
    async fn test_down_then_up_restores_schema() {
        let db = test_database().await;
        let total = Migrator::migrations().len();

        run_migration_action(&db, MigrateAction::Down { steps: 1 })
            .await
            .unwrap();
        assert_eq!(Migrator::get_pending_migrations(&db).await.unwrap().len(), 1);

        run_migration_action(&db, MigrateAction::Up { steps: None })
            .await
            .unwrap();
        assert_eq!(
            Migrator::get_applied_migrations(&db).await.unwrap().len(),
            total
        );
    }

    #[tokio::test]
    async fn test_reapply_keeps_everything_applied() {
        let db = test_database().await;

        run_migration_action(&db, MigrateAction::Reapply { steps: 5 })
            .await
            .unwrap();

        assert!(Migrator::get_pending_migrations(&db)
            .await
            .unwrap()
            .is_empty());
    }
}
