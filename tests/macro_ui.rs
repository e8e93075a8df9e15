//! trybuild：#[implementation] 与回调标记的展开

#[test]
fn ui_implementation_minimal_ok() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/happy_min.rs");
}

#[test]
fn ui_implementation_all_callback_shapes_ok() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/full_signatures.rs");
}
