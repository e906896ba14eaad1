use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use log::{error, info};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub fn establish_pool(database_url: &str, max_size: u32) -> Result<PgPool, PoolError> {
    info!("Creating database pool (max {} connections)", max_size);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    match Pool::builder().max_size(max_size).build(manager) {
        Ok(pool) => {
            info!("Database pool established successfully");
            Ok(pool)
        }
        Err(e) => {
            error!("Failed to establish database pool: {}", e);
            Err(e)
        }
    }
}

/// Round-trips `SELECT 1` to prove the pool can reach the database.
pub fn ping(pool: &PgPool) -> Result<i32, Box<dyn std::error::Error>> {
    let mut conn = pool.get()?;
    let result: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
        .get_result(&mut conn)?;
    Ok(result)
}
