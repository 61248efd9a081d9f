use super::{ensure_pending, DelayQueue, QueueOptions};
use crate::error::{JobError, Result};
use async_trait::async_trait;
use doppler_core::JobRecord;
use redis::aio::Connection;
use redis::{AsyncCommands, Client, Script};

/// Claim the earliest due id and return its record.
///
/// KEYS[1] schedule zset, KEYS[2] claims zset,
/// ARGV[1] now, ARGV[2] claim deadline, ARGV[3] record key prefix
const POP_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #ids == 0 then
    return false
end
local id = ids[1]
redis.call('ZREM', KEYS[1], id)
local raw = redis.call('GET', ARGV[3] .. id)
if not raw then
    return false
end
redis.call('ZADD', KEYS[2], ARGV[2], id)
return raw
"#;

/// Move pending jobs with an expired claim back onto the schedule.
///
/// KEYS[1] schedule zset, KEYS[2] claims zset,
/// ARGV[1] now, ARGV[2] record key prefix
const REQUEUE_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
local requeued = 0
for _, id in ipairs(ids) do
    redis.call('ZREM', KEYS[2], id)
    local raw = redis.call('GET', ARGV[2] .. id)
    if raw then
        local job = cjson.decode(raw)
        if job['status'] == 'pending' then
            redis.call('ZADD', KEYS[1], job['run_at'], id)
            requeued = requeued + 1
        end
    end
end
return requeued
"#;

/// Remove a scheduled id and flip its record to cancelled.
///
/// KEYS[1] schedule zset, KEYS[2] record key,
/// ARGV[1] request id, ARGV[2] retention seconds
const CANCEL_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
    return 0
end
local raw = redis.call('GET', KEYS[2])
if raw then
    local job = cjson.decode(raw)
    job['status'] = 'cancelled'
    redis.call('SET', KEYS[2], cjson.encode(job), 'EX', ARGV[2])
end
return 1
"#;

/// Redis-backed delay queue
///
/// Fire times live in the sorted set `{key}:schedule` scored by `run_at`,
/// claims in `{key}:claims` scored by their deadline. Each record is a JSON
/// string at `{key}:job:{request_id}`; terminal records expire after the
/// retention period.
#[derive(Debug, Clone)]
pub struct RedisQueue {
    client: Client,
    schedule_key: String,
    claims_key: String,
    record_prefix: String,
    options: QueueOptions,
    pop_script: Script,
    requeue_script: Script,
    cancel_script: Script,
}

impl RedisQueue {
    pub fn new(url: &str, key: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| JobError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            schedule_key: format!("{}:schedule", key),
            claims_key: format!("{}:claims", key),
            record_prefix: format!("{}:job:", key),
            options: QueueOptions::default(),
            pop_script: Script::new(POP_SCRIPT),
            requeue_script: Script::new(REQUEUE_SCRIPT),
            cancel_script: Script::new(CANCEL_SCRIPT),
        })
    }

    pub fn with_options(mut self, options: QueueOptions) -> Self {
        self.options = options;
        self
    }

    fn record_key(&self, request_id: &str) -> String {
        format!("{}{}", self.record_prefix, request_id)
    }

    fn retention_secs(&self) -> u64 {
        self.options.retention.as_secs().max(1)
    }

    async fn connection(&self) -> Result<Connection> {
        Ok(self.client.get_async_connection().await?)
    }

    /// Write a terminal record with its retention TTL and drop any schedule
    /// entry or claim for it.
    async fn settle(&self, job: &JobRecord) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.connection().await?;

        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.record_key(&job.request_id))
            .arg(payload)
            .arg("EX")
            .arg(self.retention_secs())
            .ignore()
            .zrem(&self.claims_key, &job.request_id)
            .ignore()
            .zrem(&self.schedule_key, &job.request_id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl DelayQueue for RedisQueue {
    async fn push(&self, job: JobRecord) -> Result<()> {
        ensure_pending(&job)?;
        let payload = serde_json::to_string(&job)?;
        let mut conn = self.connection().await?;

        // SET clears any TTL; ZADD on an existing member only moves its score
        redis::pipe()
            .atomic()
            .set(self.record_key(&job.request_id), payload)
            .ignore()
            .zadd(&self.schedule_key, &job.request_id, job.run_at)
            .ignore()
            .zrem(&self.claims_key, &job.request_id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn pop(&self, now: i64) -> Result<Option<JobRecord>> {
        let mut conn = self.connection().await?;

        let raw: Option<String> = self
            .pop_script
            .key(&self.schedule_key)
            .key(&self.claims_key)
            .arg(now)
            .arg(now.saturating_add(self.options.claim_secs()))
            .arg(&self.record_prefix)
            .invoke_async(&mut conn)
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn complete(&self, job: &JobRecord) -> Result<()> {
        self.settle(job).await
    }

    async fn fail(&self, job: &JobRecord) -> Result<()> {
        self.settle(job).await
    }

    async fn requeue_expired(&self, now: i64) -> Result<usize> {
        let mut conn = self.connection().await?;

        let requeued: usize = self
            .requeue_script
            .key(&self.schedule_key)
            .key(&self.claims_key)
            .arg(now)
            .arg(&self.record_prefix)
            .invoke_async(&mut conn)
            .await?;

        Ok(requeued)
    }

    async fn cancel(&self, request_id: &str) -> Result<bool> {
        let mut conn = self.connection().await?;

        let removed: i64 = self
            .cancel_script
            .key(&self.schedule_key)
            .key(self.record_key(request_id))
            .arg(request_id)
            .arg(self.retention_secs())
            .invoke_async(&mut conn)
            .await?;

        Ok(removed == 1)
    }

    async fn get(&self, request_id: &str) -> Result<Option<JobRecord>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(self.record_key(request_id)).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
