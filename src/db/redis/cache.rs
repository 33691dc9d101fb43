use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::error::AppResult;
use crate::models::MovieId;

/// Pending title writes held before new ones are dropped
const WRITE_QUEUE_CAPACITY: usize = 1024;

/// Largest number of writes sent in one pipeline
const MAX_WRITE_BATCH: usize = 64;

/// Time a resolved title stays in Redis
pub const TITLE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Free-text title as produced by the language model. Kept verbatim:
    /// case and whitespace variants are distinct keys.
    TitleToImdb(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::TitleToImdb(title) => write!(f, "title2imdb:{}", title),
        }
    }
}

pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TitleWrite {
    key: String,
    movie_id: String,
}

/// Title to IMDb id mapping shared between bot instances
///
/// Reads go straight to Redis. Writes are queued and sent in pipelined
/// batches by a background task, so a slow Redis never holds up a lookup.
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::Sender<TitleWrite>,
}

/// Stops the writer task after it flushes queued writes
///
/// Dropping the handle without calling [`CacheWriterHandle::shutdown`] also
/// stops the writer.
pub struct CacheWriterHandle {
    stop_tx: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<usize>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(());
        match self.task.await {
            Ok(written) => tracing::info!(written, "Title cache writer stopped"),
            Err(e) => tracing::error!(error = %e, "Title cache writer panicked"),
        }
    }
}

impl Cache {
    /// Creates the cache and spawns its writer. Must be called inside a runtime.
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(run_writer(redis_client.clone(), write_rx, stop_rx));

        (
            Self {
                redis_client,
                write_tx,
            },
            CacheWriterHandle { stop_tx, task },
        )
    }

    /// Cached id for the exact title, `None` on a miss
    pub async fn get_title(&self, title: &str) -> AppResult<Option<MovieId>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = CacheKey::TitleToImdb(title.to_string()).to_string();
        let cached: Option<String> = conn.get(key).await?;
        Ok(cached.filter(|id| !id.is_empty()).map(MovieId::new))
    }

    /// Queues the mapping; dropped with a warning when the queue is full
    pub fn put_title(&self, title: &str, movie_id: &MovieId) {
        let write = TitleWrite {
            key: CacheKey::TitleToImdb(title.to_string()).to_string(),
            movie_id: movie_id.to_string(),
        };
        if let Err(e) = self.write_tx.try_send(write) {
            tracing::warn!(error = %e, title = %title, "Title cache write dropped");
        }
    }
}

/// Pulls whatever is already queued behind `first`, up to `limit` writes
fn drain_batch(
    first: TitleWrite,
    write_rx: &mut mpsc::Receiver<TitleWrite>,
    limit: usize,
) -> Vec<TitleWrite> {
    let mut batch = vec![first];
    while batch.len() < limit {
        match write_rx.try_recv() {
            Ok(write) => batch.push(write),
            Err(_) => break,
        }
    }
    batch
}

async fn write_batch(client: &Client, batch: &[TitleWrite]) -> AppResult<()> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let mut pipe = redis::pipe();
    for write in batch {
        pipe.set_ex(&write.key, &write.movie_id, TITLE_TTL.as_secs())
            .ignore();
    }
    let _: () = pipe.query_async(&mut conn).await?;
    Ok(())
}

/// Returns the number of titles written
async fn run_writer(
    client: Client,
    mut write_rx: mpsc::Receiver<TitleWrite>,
    mut stop_rx: oneshot::Receiver<()>,
) -> usize {
    let mut written = 0;
    let mut stopping = false;

    loop {
        let next = if stopping {
            write_rx.recv().await
        } else {
            tokio::select! {
                next = write_rx.recv() => next,
                _ = &mut stop_rx => {
                    stopping = true;
                    write_rx.close();
                    write_rx.recv().await
                }
            }
        };
        let Some(first) = next else {
            break;
        };

        let batch = drain_batch(first, &mut write_rx, MAX_WRITE_BATCH);
        match write_batch(&client, &batch).await {
            Ok(()) => written += batch.len(),
            Err(e) => tracing::error!(error = %e, count = batch.len(), "Title cache write failed"),
        }
    }

    written
}
