pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use fixtures::{DemoSeedDataset, SeedResult, SeededUser, VerificationResult};
pub use repositories::{
    ApplicationRepository, InMemoryApplicationRepository, InMemoryUserRepository,
    RepositoryError, SqlApplicationRepository, SqlUserRepository, UserRepository,
    MAX_LIST_LIMIT,
};
