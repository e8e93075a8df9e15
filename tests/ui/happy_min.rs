use mmg_scr::prelude::*;

#[derive(Default)]
struct Minimal;

#[mmg_scr::implementation]
impl Minimal {
    #[activate]
    fn activate(&self) {}
}

fn main() {
    let registry = ImplementationRegistry::from_inventory();
    assert!(registry.resolve("Minimal").is_some());
}
