//! 演示：时钟服务 + 依赖它的问候组件 + 工厂组件，配置经命令通道推送
use mmg_scr::{prelude::*, registry::ServiceObject};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

trait Clock: Send + Sync {
    fn now(&self) -> String;
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("t+{secs}")
    }
}

// 手写回调表：以 trait 对象发布
fn clock_implementation() -> ImplementationType {
    ImplementationType::builder::<SystemClock>("demo.SystemClock", |_ctx: &ComponentContext| Ok(SystemClock))
        .expose(|clock: Arc<SystemClock>| {
            let clock: Arc<dyn Clock> = clock;
            Arc::new(clock) as ServiceObject
        })
        .build()
}

#[derive(Default)]
struct Greeter {
    clock: Mutex<Option<Arc<dyn Clock>>>,
}

impl Greeter {
    fn greet(&self, ctx: &ComponentContext) {
        let greeting = ctx
            .property("greeting")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "hello".into());
        let at = self.clock.lock().as_ref().map(|c| c.now()).unwrap_or_default();
        tracing::info!(target: "demo.greeter", %greeting, %at, "greeting");
    }
}

#[mmg_scr::implementation(name = "demo.Greeter")]
impl Greeter {
    #[activate]
    fn activate(&self, ctx: &ComponentContext) {
        self.greet(ctx);
    }

    #[modified]
    fn modified(&self, ctx: &ComponentContext) {
        self.greet(ctx);
    }

    #[deactivate]
    fn deactivate(&self, reason: DeactivationReason) {
        tracing::info!(target: "demo.greeter", %reason, "greeter stopped");
    }

    #[bind(name = "setClock")]
    fn set_clock(&self, svc: &BoundService) -> anyhow::Result<()> {
        let clock = svc
            .get::<Arc<dyn Clock>>()
            .ok_or_else(|| anyhow::anyhow!("service {} is not a clock", svc.id().0))?;
        *self.clock.lock() = Some((*clock).clone());
        Ok(())
    }

    #[unbind(name = "unsetClock")]
    fn unset_clock(&self, _svc: &BoundService) {
        self.clock.lock().take();
    }
}

#[derive(Default)]
struct Session;

#[mmg_scr::implementation(name = "demo.Session")]
impl Session {
    #[activate]
    fn open(&self, ctx: &ComponentContext) {
        tracing::info!(target: "demo.session", user = ?ctx.property("user"), "session opened");
    }

    #[deactivate]
    fn close(&self, reason: DeactivationReason) {
        tracing::info!(target: "demo.session", %reason, "session closed");
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    mmg_scr::app::init_logging();
    let implementations = ImplementationRegistry::from_inventory();
    implementations.register(clock_implementation());

    let mut app = App::with_implementations(ScrConfig::default(), implementations);
    app.component(ComponentDescription::new("clock", "demo.SystemClock").service("demo.Clock"))
        .component(
            ComponentDescription::new("greeter", "demo.Greeter")
                .activate("activate")
                .modified("modified")
                .deactivate("deactivate")
                .property("greeting", "hello")
                .reference(
                    ReferenceDescription::new("clock", "demo.Clock")
                        .bind("setClock")
                        .unbind("unsetClock"),
                ),
        )
        .component(
            ComponentDescription::new("session", "demo.Session")
                .factory("demo.session")
                .activate("open")
                .deactivate("close"),
        );
    app.start().await?;

    app.configuration_sender()
        .send(ConfigCommand::Update {
            pid: "greeter".into(),
            properties: Properties::new().with("greeting", "bonjour"),
        })
        .await
        .map_err(|e| anyhow::anyhow!("configuration channel closed: {e}"))?;

    let session = app
        .new_instance("session", Properties::new().with("user", "ada"))
        .await?;
    tracing::info!(target: "demo", key = %session.key(), "instance created");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!(target: "demo", "interrupted"),
        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
    }
    app.stop().await?;
    Ok(())
}
