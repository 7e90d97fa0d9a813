/// Database layer
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: embedded migration runner
///
/// Entity persistence lives in [`crate::repository`].

pub mod migrations;
pub mod pool;
