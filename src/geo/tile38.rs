//! Tile38 speaks RESP, so the index is driven through the `redis` client.

use super::{GeoIndex, Geometry, IndexError, SetOptions};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Tile38Config {
    pub host: String,
    pub port: u16,
    /// Log every command at INFO.
    pub debug: bool,
    /// TTL applied when an upsert asks for expiry.
    pub expire_seconds: u64,
}

impl Default for Tile38Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9851,
            debug: false,
            expire_seconds: 300,
        }
    }
}

impl Tile38Config {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Arguments of `SET collection key [EX ttl] OBJECT geojson`.
pub fn set_args(
    collection: &str,
    key: &str,
    geometry: &Geometry,
    options: SetOptions,
    expire_seconds: u64,
) -> Result<Vec<String>, IndexError> {
    let mut args = vec![collection.to_string(), key.to_string()];
    if options.expire {
        args.push("EX".to_string());
        args.push(expire_seconds.to_string());
    }
    args.push("OBJECT".to_string());
    args.push(geometry.to_json()?);
    Ok(args)
}

pub struct Tile38Client {
    conn: MultiplexedConnection,
    config: Tile38Config,
}

impl Tile38Client {
    /// Connects and pings, so a wrong host or port fails here rather than on
    /// the first upsert.
    pub async fn connect(config: Tile38Config) -> Result<Self, IndexError> {
        let client = redis::Client::open(config.url())
            .map_err(|e| IndexError::Connection(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| IndexError::Connection(e.to_string()))?;

        let _: redis::Value = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| IndexError::Connection(e.to_string()))?;

        info!(host = %config.host, port = config.port, "Connected to Tile38");
        Ok(Self { conn, config })
    }
}

#[async_trait]
impl GeoIndex for Tile38Client {
    async fn upsert(
        &mut self,
        collection: &str,
        key: &str,
        geometry: &Geometry,
        options: SetOptions,
    ) -> Result<(), IndexError> {
        let args = set_args(collection, key, geometry, options, self.config.expire_seconds)?;
        if self.config.debug {
            info!(command = %format!("SET {}", args.join(" ")), "Tile38 command");
        } else {
            debug!(collection, key, expire = options.expire, "Tile38 SET");
        }

        let _: redis::Value = redis::cmd("SET")
            .arg(&args)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| IndexError::Command(e.to_string()))?;
        Ok(())
    }
}
