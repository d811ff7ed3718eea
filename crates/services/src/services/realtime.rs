//! Turns database change events into cache invalidations and client notifications.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use db::{DBService, Table, TableChange};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};
use ts_rs::TS;

use super::query_cache::QueryCache;

/// Derived view invalidated whenever the tasks it aggregates change.
pub const DASHBOARD_TOPIC: &str = "dashboard";

const HUB_CAPACITY: usize = 256;

/// Sent to clients: re-fetch anything built from `table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Invalidation {
    pub table: String,
}

/// Decides which cached topics a single change makes stale.
pub trait InvalidationStrategy: Send + Sync {
    fn affected(&self, change: &TableChange) -> Vec<String>;

    /// Every topic this strategy can produce, used after missed events.
    fn all_topics(&self) -> Vec<String>;
}

/// Coarse per-table invalidation: a change to a table stales that table and its dependents.
pub struct TableInvalidation {
    dependents: HashMap<Table, Vec<String>>,
}

impl TableInvalidation {
    pub fn new() -> Self {
        Self {
            dependents: HashMap::new(),
        }
    }

    pub fn with_dependent(mut self, table: Table, topic: impl Into<String>) -> Self {
        self.dependents.entry(table).or_default().push(topic.into());
        self
    }
}

impl Default for TableInvalidation {
    fn default() -> Self {
        let routines = Table::Routines.to_string();
        let notes = Table::Notes.to_string();
        Self::new()
            .with_dependent(Table::RoutineCheckins, routines.clone())
            .with_dependent(Table::RoutineCheckins, Table::RoutinePeriods.to_string())
            .with_dependent(Table::RoutinePeriods, routines.clone())
            .with_dependent(Table::RoutineUnits, routines.clone())
            .with_dependent(Table::RoutineAssignees, routines)
            .with_dependent(Table::Tasks, DASHBOARD_TOPIC)
            .with_dependent(Table::Units, DASHBOARD_TOPIC)
            .with_dependent(Table::Sectors, DASHBOARD_TOPIC)
            .with_dependent(Table::Routines, DASHBOARD_TOPIC)
            .with_dependent(Table::NoteAttachments, notes)
    }
}

impl InvalidationStrategy for TableInvalidation {
    fn affected(&self, change: &TableChange) -> Vec<String> {
        let mut topics = vec![change.table.to_string()];
        if let Some(dependents) = self.dependents.get(&change.table) {
            topics.extend(dependents.iter().cloned());
        }
        topics
    }

    fn all_topics(&self) -> Vec<String> {
        let mut topics: BTreeSet<String> = Table::iter().map(|t| t.to_string()).collect();
        topics.extend(self.dependents.values().flatten().cloned());
        topics.into_iter().collect()
    }
}

/// Fan-out point for invalidations; the SSE endpoint subscribes here.
#[derive(Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<Invalidation>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }
}

impl RealtimeHub {
    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.sender.subscribe()
    }

    pub fn publish(&self, table: &str) {
        // nobody listening is fine
        let _ = self.sender.send(Invalidation {
            table: table.to_string(),
        });
    }
}

pub struct RealtimeService {
    cache: QueryCache,
    hub: RealtimeHub,
    strategy: Arc<dyn InvalidationStrategy>,
}

impl RealtimeService {
    pub fn new(cache: QueryCache, hub: RealtimeHub, strategy: Arc<dyn InvalidationStrategy>) -> Self {
        Self {
            cache,
            hub,
            strategy,
        }
    }

    /// Subscribe to `db`'s change feed and process it until the feed closes.
    pub async fn spawn(self, db: &DBService) -> tokio::task::JoinHandle<()> {
        let changes = db.subscribe();
        tokio::spawn(async move {
            self.start(changes).await;
        })
    }

    async fn start(&self, mut changes: broadcast::Receiver<TableChange>) {
        info!("Starting realtime invalidation service");
        loop {
            let topics = match changes.recv().await {
                Ok(change) => {
                    let mut topics: BTreeSet<String> =
                        self.strategy.affected(&change).into_iter().collect();
                    // a statement batch arrives as a burst; fold it into one round
                    loop {
                        match changes.try_recv() {
                            Ok(next) => topics.extend(self.strategy.affected(&next)),
                            Err(TryRecvError::Lagged(skipped)) => {
                                warn!(skipped, "Realtime feed lagged; invalidating everything");
                                topics.extend(self.strategy.all_topics());
                            }
                            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                        }
                    }
                    topics
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Realtime feed lagged; invalidating everything");
                    self.strategy.all_topics().into_iter().collect()
                }
                Err(RecvError::Closed) => {
                    info!("Change feed closed; stopping realtime service");
                    break;
                }
            };
            self.apply(&topics).await;
        }
    }

    async fn apply(&self, topics: &BTreeSet<String>) {
        for topic in topics {
            self.cache.invalidate_table(topic).await;
            self.hub.publish(topic);
        }
        debug!(topics = ?topics, "Published invalidations");
    }
}
