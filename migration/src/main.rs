use migration::Migrator;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use util::config::AppConfig;

#[tokio::main]
async fn main() {
    let path = AppConfig::global().database_path.clone();
    let url = if path.starts_with("sqlite:") {
        path
    } else {
        if let Some(parent) = std::path::Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        format!("sqlite://{path}?mode=rwc")
    };

    let db = Database::connect(&url)
        .await
        .expect("Failed to connect to database");

    Migrator::up(&db, None).await.expect("Migration failed");

    println!("Migrations applied to {url}");
}
