use script_scheduler::{app_info::AppInfo, boot::boot};

#[tokio::main]
async fn main() {
    boot(AppInfo::from_package()).await;
}
