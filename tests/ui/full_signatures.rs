use mmg_scr::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct Full {
    bound: AtomicUsize,
}

#[mmg_scr::implementation(name = "ui.Full")]
impl Full {
    #[mmg_scr::activate]
    fn start(&self, _ctx: &ComponentContext) -> anyhow::Result<()> {
        Ok(())
    }

    #[mmg_scr::deactivate]
    fn stop(&self, _ctx: &ComponentContext, _reason: DeactivationReason) {}

    #[mmg_scr::modified]
    fn reload(&self, _ctx: &ComponentContext) -> std::result::Result<(), std::io::Error> {
        Ok(())
    }

    #[mmg_scr::bind(name = "setLog")]
    fn set_log(&self, _svc: &BoundService) {
        self.bound.fetch_add(1, Ordering::Relaxed);
    }

    #[mmg_scr::unbind(name = "unsetLog")]
    fn unset_log(&self, _svc: &BoundService) {
        self.bound.fetch_sub(1, Ordering::Relaxed);
    }

    #[mmg_scr::updated]
    fn log_changed(&self, _svc: &BoundService) -> anyhow::Result<()> {
        Ok(())
    }

    fn not_a_callback(&self) -> usize {
        self.bound.load(Ordering::Relaxed)
    }
}

fn main() {
    let registry = ImplementationRegistry::from_inventory();
    let full = registry.resolve("ui.Full").unwrap();
    for cb in ["start", "stop", "reload", "setLog", "unsetLog", "log_changed"] {
        assert!(full.has_callback(cb));
    }
    assert!(!full.has_callback("not_a_callback"));
    assert_eq!(Full::default().not_a_callback(), 0);
}
