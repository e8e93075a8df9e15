use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
};

use crate::{
    component::ComponentInstanceHandle,
    config::ScrConfig,
    config_store::ConfigurationStore,
    description::ComponentDescription,
    error::{Result, ScrError},
    implementation::ImplementationRegistry,
    properties::Properties,
    registry::ServiceRegistry,
    scr::Scr,
};

/// 经 [`App::configuration_sender`] 送入配置存储的变更
#[derive(Clone, Debug)]
pub enum ConfigCommand {
    Update { pid: String, properties: Properties },
    CreateFactory { factory_pid: String, properties: Properties },
    Delete { pid: String },
}

pub struct StopFlag {
    set: AtomicBool,
    notify: Notify,
}

impl StopFlag {
    pub(crate) fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }
    pub(crate) fn trigger(&self) {
        if !self.set.swap(true, Ordering::Release) {
            self.notify.notify_waiters();
        }
    }
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // 先登记再检查，避免错过 trigger
        notified.as_mut().enable();
        if self.is_set() {
            return;
        }
        notified.await;
    }
}

/// fmt 订阅器；重复调用无副作用
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
}

fn join_error(e: tokio::task::JoinError) -> ScrError {
    ScrError::Runtime(format!("blocking task failed: {e}"))
}

fn apply_command(store: &ConfigurationStore, command: ConfigCommand) {
    match command {
        ConfigCommand::Update { pid, properties } => store.update(pid, properties),
        ConfigCommand::CreateFactory {
            factory_pid,
            properties,
        } => {
            let pid = store.create_factory_configuration(factory_pid, properties);
            tracing::debug!(pid = %pid, "factory configuration created");
        }
        ConfigCommand::Delete { pid } => {
            if !store.delete(&pid) {
                tracing::warn!(pid = %pid, "delete of unknown configuration");
            }
        }
    }
}

pub struct App {
    cfg: ScrConfig,
    scr: Scr,
    registry: ServiceRegistry,
    store: ConfigurationStore,
    // 启动前暂存的组件描述，start 时统一加载
    staged: Vec<ComponentDescription>,
    tasks: Vec<JoinHandle<()>>,
    commands_tx: mpsc::Sender<ConfigCommand>,
    commands_rx: Option<mpsc::Receiver<ConfigCommand>>,
    stop_flag: Arc<StopFlag>,
    started: bool,
}

impl App {
    /// 实现类型来自 inventory（`#[mmg_scr::implementation]`）
    pub fn new(cfg: ScrConfig) -> Self {
        Self::with_implementations(cfg, ImplementationRegistry::from_inventory())
    }

    pub fn with_implementations(cfg: ScrConfig, implementations: ImplementationRegistry) -> Self {
        let registry = ServiceRegistry::new();
        let store = ConfigurationStore::new();
        let scr = Scr::new(cfg.clone(), registry.clone(), implementations, Some(store.clone()));
        let (commands_tx, commands_rx) = mpsc::channel(cfg.queue_capacity.max(1));
        Self {
            cfg,
            scr,
            registry,
            store,
            staged: Vec::new(),
            tasks: Vec::new(),
            commands_tx,
            commands_rx: Some(commands_rx),
            stop_flag: Arc::new(StopFlag::new()),
            started: false,
        }
    }

    /// 仅在启动前允许；启动后忽略并告警
    pub fn component(&mut self, desc: ComponentDescription) -> &mut Self {
        if self.started {
            tracing::warn!(component = %desc.name, "component() called after start(); ignoring");
            return self;
        }
        self.staged.push(desc);
        self
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        let staged = std::mem::take(&mut self.staged);
        let scr = self.scr.clone();
        // 激活会同步调用用户代码，放到阻塞线程
        let errors = tokio::task::spawn_blocking(move || scr.load(staged))
            .await
            .map_err(join_error)?;
        for e in &errors {
            tracing::warn!(error = %e, "component skipped at start");
        }
        if let Some(mut rx) = self.commands_rx.take() {
            let stop = self.stop_flag.clone();
            let store = self.store.clone();
            let fut = async move {
                loop {
                    tokio::select! {
                        _ = stop.wait() => break,
                        cmd = rx.recv() => {
                            let Some(cmd) = cmd else { break };
                            let store = store.clone();
                            if let Err(e) = tokio::task::spawn_blocking(move || apply_command(&store, cmd)).await {
                                tracing::error!(error = %e, "configuration command failed");
                            }
                        }
                    }
                }
            };
            self.tasks.push(tokio::spawn(fut));
        }
        self.started = true;
        tracing::info!(components = self.scr.components().len(), queue = self.cfg.queue_capacity, "runtime started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        // 1) 停止配置命令泵
        self.stop_flag.trigger();
        let mut rest = Vec::new();
        rest.append(&mut self.tasks);
        for h in rest.into_iter() {
            let _ = h.await;
        }
        // 2) 以 Stopped 原因停用所有组件
        let scr = self.scr.clone();
        tokio::task::spawn_blocking(move || scr.shutdown())
            .await
            .map_err(join_error)?;
        self.started = false;
        Ok(())
    }

    pub fn configuration_sender(&self) -> mpsc::Sender<ConfigCommand> {
        self.commands_tx.clone()
    }

    pub async fn new_instance(&self, component: &str, overrides: Properties) -> Result<ComponentInstanceHandle> {
        let scr = self.scr.clone();
        let name = component.to_string();
        tokio::task::spawn_blocking(move || scr.new_instance(&name, overrides))
            .await
            .map_err(join_error)?
    }

    pub fn scr(&self) -> &Scr {
        &self.scr
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn config_store(&self) -> &ConfigurationStore {
        &self.store
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}
