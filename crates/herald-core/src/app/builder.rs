//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! 必須なのは TaskStore だけ。それ以外は省略するとインメモリ実装が入る。
//! - Clock: SystemClock
//! - JobStore: InMemoryJobStore
//! - Publisher: LocalTransport（pump が PubSubBridge に配る）
//!
//! 設定は build() 時に検証する（Fail-fast）。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::dispatcher::Dispatcher;
use super::reaper_loop::JobReaper;
use super::scheduler::Scheduler;
use super::status::StatusReporter;
use super::worker_loop::{WorkerGroup, WorkerLoop};
use crate::config::HeraldConfig;
use crate::error::HeraldError;
use crate::impls::{LocalTransport, PubSubBridge, run_pump};
use crate::ports::{Clock, IdGenerator, JobStore, Publisher, SystemClock, TaskStore, UlidGenerator};
use crate::queue::InMemoryJobStore;

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("a task store is required to look up tasks and users at dispatch time")]
    MissingTaskStore,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] HeraldError),
}

/// # 使用例
/// ```ignore
/// let mut app = AppBuilder::new(config)
///     .task_store(storage)
///     .build()?;
/// let running = app.start();
/// ```
pub struct AppBuilder {
    config: HeraldConfig,
    clock: Option<Arc<dyn Clock>>,
    task_store: Option<Arc<dyn TaskStore>>,
    job_store: Option<Arc<dyn JobStore>>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl AppBuilder {
    pub fn new(config: HeraldConfig) -> Self {
        Self {
            config,
            clock: None,
            task_store: None,
            job_store: None,
            publisher: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn task_store(mut self, task_store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(task_store);
        self
    }

    pub fn job_store(mut self, job_store: Arc<dyn JobStore>) -> Self {
        self.job_store = Some(job_store);
        self
    }

    /// 独自の Publisher を使う場合、bridge には何も流れない。
    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;
        let task_store = self.task_store.ok_or(BuildError::MissingTaskStore)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));
        let job_store = self
            .job_store
            .unwrap_or_else(|| Arc::new(InMemoryJobStore::new(clock.clone(), ids.clone())));
        let bridge = Arc::new(PubSubBridge::new(ids));

        let (publisher, transport_rx): (Arc<dyn Publisher>, _) = match self.publisher {
            Some(publisher) => (publisher, None),
            None => {
                let (transport, rx) = LocalTransport::channel();
                let transport: Arc<dyn Publisher> = Arc::new(transport);
                (transport, Some(rx))
            }
        };

        let config = self.config;
        let scheduler = Arc::new(Scheduler::new(
            job_store.clone(),
            clock.clone(),
            config.reminder_lead_time(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            job_store.clone(),
            task_store,
            publisher,
            clock.clone(),
            config.retry_policy(),
        ));
        let reaper = Arc::new(JobReaper::new(
            job_store.clone(),
            clock.clone(),
            config.claim_timeout(),
            config.terminal_retention(),
        ));
        let reporter = Arc::new(StatusReporter::new(job_store.clone(), clock));
        let worker = Arc::new(WorkerLoop::new(
            scheduler.clone(),
            dispatcher,
            reaper,
            reporter.clone(),
            config.poll_interval(),
        ));

        tracing::debug!(
            lead_time_secs = config.reminder_lead_time_secs,
            poll_interval_secs = config.poll_interval_secs,
            max_retries = config.max_retries,
            "herald app built"
        );

        Ok(App {
            config,
            scheduler,
            job_store,
            bridge,
            reporter,
            worker,
            transport_rx,
        })
    }
}

pub struct App {
    config: HeraldConfig,
    scheduler: Arc<Scheduler>,
    job_store: Arc<dyn JobStore>,
    bridge: Arc<PubSubBridge>,
    reporter: Arc<StatusReporter>,
    worker: Arc<WorkerLoop>,
    transport_rx: Option<mpsc::UnboundedReceiver<String>>,
}

impl App {
    pub fn config(&self) -> &HeraldConfig {
        &self.config
    }

    /// task の変更はここに通知する。
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn job_store(&self) -> &Arc<dyn JobStore> {
        &self.job_store
    }

    /// 購読（subscribe / unsubscribe）の窓口
    pub fn bridge(&self) -> &Arc<PubSubBridge> {
        &self.bridge
    }

    pub fn status(&self) -> &Arc<StatusReporter> {
        &self.reporter
    }

    pub fn worker(&self) -> &Arc<WorkerLoop> {
        &self.worker
    }

    /// pump（既定の transport の場合）と worker を起動する。
    /// pump は最初の start でのみ起動する。
    pub fn start(&mut self) -> RunningApp {
        let pump = self
            .transport_rx
            .take()
            .map(|rx| tokio::spawn(run_pump(self.bridge.clone(), rx)));
        let workers = WorkerGroup::spawn(self.config.worker_count, self.worker.clone());
        tracing::info!(workers = workers.len(), "herald started");
        RunningApp { workers, pump }
    }
}

pub struct RunningApp {
    workers: WorkerGroup,
    pump: Option<JoinHandle<()>>,
}

impl RunningApp {
    /// worker を止めてから pump を止める。
    pub async fn shutdown(self) {
        self.workers.shutdown_and_join().await;
        if let Some(pump) = self.pump {
            // sender は App 側の Dispatcher が握っているので自然には終わらない
            pump.abort();
            let _ = pump.await;
        }
        tracing::info!("herald stopped");
    }
}
