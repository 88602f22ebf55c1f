pub use sea_orm_migration::prelude::*;

mod m20250801_000001_accounts;
mod m20250801_000002_time_tracking;

pub struct Migrator;
#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250801_000001_accounts::Migration),
            Box::new(m20250801_000002_time_tracking::Migration),
        ]
    }
}
