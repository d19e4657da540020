//! Redis connection settings shared by the stores.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::AsyncConnectionConfig;

use crate::error::QueueResult;

/// Connect and response timeout for queue, status and result round trips.
pub const DEFAULT_REDIS_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn connection_config(timeout: Duration) -> AsyncConnectionConfig {
    AsyncConnectionConfig::new()
        .set_connection_timeout(timeout)
        .set_response_timeout(timeout)
}

/// Open a multiplexed connection whose commands fail after `timeout`.
pub(crate) async fn connect(
    client: &redis::Client,
    timeout: Duration,
) -> QueueResult<MultiplexedConnection> {
    let conn = client
        .get_multiplexed_async_connection_with_config(&connection_config(timeout))
        .await?;
    Ok(conn)
}
