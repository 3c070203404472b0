//! Redis Streams bus client: append, consumer-group read, ack, stale-pending reclamation.
//!
//! Grounded on `server/src/data/cache/redis.rs`'s pool setup and
//! `server/src/data/topics/redis.rs`'s `RedisTopicBackend` (consumer-group
//! creation, `XREADGROUP`/`XAUTOCLAIM` response parsing via
//! `deadpool_redis::redis::Value`). Field semantics follow the original
//! `twitch_gateway/redis_bus.py` and `ai_chat_brain/redis_io.py`.

use std::collections::HashMap;
use std::time::Duration;

use deadpool_redis::redis::Value as RedisValue;
use deadpool_redis::{Config, Pool, Runtime};

use crate::error::BusError;
use crate::message::StreamEntry;

/// Which end of a consumer group's delivery cursor to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// `>` — only messages never delivered to any consumer in the group.
    New,
    /// `0` — this consumer's own still-pending (unacked) messages.
    Pending,
}

impl ReadFrom {
    fn as_arg(self) -> &'static str {
        match self {
            ReadFrom::New => ">",
            ReadFrom::Pending => "0",
        }
    }
}

/// Durable append-only stream bus shared by the Gateway and the Brain.
///
/// Safe to use concurrently from multiple tasks: every method borrows a
/// fresh connection from the pool, matching the teacher's pattern of never
/// holding a connection across an await point outside a single command.
pub struct BusClient {
    pool: Pool,
}

impl BusClient {
    /// Connect and validate with `PING`, as `RedisTopicBackend::new` does.
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let mut config = Config::from_url(redis_url);
        config.pool = Some(deadpool_redis::PoolConfig {
            max_size: 16,
            timeouts: deadpool_redis::Timeouts {
                wait: Some(Duration::from_secs(5)),
                create: Some(Duration::from_secs(5)),
                recycle: Some(Duration::from_secs(5)),
            },
            ..Default::default()
        });

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| BusError::Connection(format!("failed to create pool: {e}")))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| BusError::Connection(format!("failed to get connection: {e}")))?;

        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| BusError::Connection(format!("PING failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Ensure a consumer group exists on `stream`, creating the stream if
    /// absent. Idempotent: `BUSYGROUP` (already exists) is not an error.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), BusError> {
        let mut conn = self.pool.get().await?;

        let result: Result<String, _> = deadpool_redis::redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(BusError::ConsumerGroup {
                stream: stream.to_string(),
                group: group.to_string(),
                source: e,
            }),
        }
    }

    /// `XADD stream * field value [field value ...]`, returning the assigned id.
    pub async fn xadd(
        &self,
        stream: &str,
        fields: &[(String, String)],
    ) -> Result<String, BusError> {
        let mut conn = self.pool.get().await?;
        let mut cmd = deadpool_redis::redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        let id: String = cmd.query_async(&mut conn).await?;
        Ok(id)
    }

    /// `XREADGROUP`, consuming from [`ReadFrom::New`] or re-reading this
    /// consumer's own [`ReadFrom::Pending`] entries.
    pub async fn read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamEntry>, BusError> {
        let mut conn = self.pool.get().await?;

        let mut cmd = deadpool_redis::redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer);
        // BLOCK only makes sense when reading new messages; re-reading the
        // pending list returns immediately regardless of ask.
        if matches!(from, ReadFrom::New) {
            cmd.arg("BLOCK").arg(block_ms);
        }
        cmd.arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(stream)
            .arg(from.as_arg());

        let value: RedisValue = cmd.query_async(&mut conn).await?;
        Ok(parse_stream_response(value))
    }

    /// `XACK`. Empty batches are a no-op, matching the contract that acks are
    /// batched and idempotent.
    pub async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<(), BusError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        let mut cmd = deadpool_redis::redis::cmd("XACK");
        cmd.arg(stream).arg(group);
        for id in ids {
            cmd.arg(id.as_str());
        }
        let _: i64 = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    /// `XAUTOCLAIM`, reassigning entries idle for at least `min_idle_ms` to
    /// `consumer`. Used by the Gateway's Sender to recover messages left
    /// pending by a crashed prior consumer.
    pub async fn autoclaim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamEntry>, BusError> {
        let mut conn = self.pool.get().await?;

        let value: RedisValue = deadpool_redis::redis::cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        // Reply shape: [next-start-id, [[id, [field, value, ...]], ...], [deleted-id, ...]].
        let RedisValue::Array(parts) = value else {
            return Ok(Vec::new());
        };
        let Some(entries) = parts.into_iter().nth(1) else {
            return Ok(Vec::new());
        };
        Ok(parse_entry_array(entries))
    }
}

fn parse_stream_response(value: RedisValue) -> Vec<StreamEntry> {
    // Response format: [[stream_name, [[id, [field, value, ...]], ...]], ...]
    let RedisValue::Array(streams) = value else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for stream_data in streams {
        let RedisValue::Array(parts) = stream_data else {
            continue;
        };
        if parts.len() < 2 {
            continue;
        }
        out.extend(parse_entry_array(parts[1].clone()));
    }
    out
}

fn parse_entry_array(value: RedisValue) -> Vec<StreamEntry> {
    let RedisValue::Array(entries) = value else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for entry in entries {
        let RedisValue::Array(entry_parts) = entry else {
            continue;
        };
        if entry_parts.len() < 2 {
            continue;
        }
        let (id_value, fields_value) = (&entry_parts[0], &entry_parts[1]);
        let RedisValue::BulkString(id_bytes) = id_value else {
            continue;
        };
        let Ok(id) = String::from_utf8(id_bytes.clone()) else {
            continue;
        };
        let RedisValue::Array(field_values) = fields_value else {
            continue;
        };
        out.push(StreamEntry {
            id,
            fields: parse_field_pairs(field_values),
        });
    }
    out
}

fn parse_field_pairs(values: &[RedisValue]) -> HashMap<String, String> {
    let mut fields = HashMap::with_capacity(values.len() / 2);
    let mut iter = values.iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        if let (RedisValue::BulkString(k), RedisValue::BulkString(v)) = (key, value)
            && let (Ok(k), Ok(v)) = (String::from_utf8(k.clone()), String::from_utf8(v.clone()))
        {
            fields.insert(k, v);
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> RedisValue {
        RedisValue::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn parse_field_pairs_builds_map() {
        let values = vec![bulk("channel"), bulk("demo"), bulk("text"), bulk("hi")];
        let fields = parse_field_pairs(&values);
        assert_eq!(fields.get("channel").map(String::as_str), Some("demo"));
        assert_eq!(fields.get("text").map(String::as_str), Some("hi"));
    }

    #[test]
    fn parse_stream_response_extracts_entries() {
        let value = RedisValue::Array(vec![RedisValue::Array(vec![
            bulk("chat:in"),
            RedisValue::Array(vec![RedisValue::Array(vec![
                bulk("1700000000000-0"),
                RedisValue::Array(vec![bulk("channel"), bulk("demo")]),
            ])]),
        ])]);

        let entries = parse_stream_response(value);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "1700000000000-0");
        assert_eq!(entries[0].fields.get("channel").map(String::as_str), Some("demo"));
    }

    #[test]
    fn parse_stream_response_empty_on_nil_shaped_input() {
        let entries = parse_stream_response(RedisValue::Nil);
        assert!(entries.is_empty());
    }

    #[test]
    fn read_from_as_arg() {
        assert_eq!(ReadFrom::New.as_arg(), ">");
        assert_eq!(ReadFrom::Pending.as_arg(), "0");
    }
}
