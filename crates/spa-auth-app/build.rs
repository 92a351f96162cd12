use std::path::Path;

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR");
    let version_file = Path::new(&manifest_dir)
        .ancestors()
        .nth(2)
        .map(|root| root.join("VERSION"))
        .expect("crate lives under <root>/crates/<name>");

    println!("cargo:rerun-if-changed={}", version_file.display());

    let version = std::fs::read_to_string(&version_file)
        .unwrap_or_else(|error| panic!("cannot read {}: {error}", version_file.display()));
    let version = version.trim();
    if version.is_empty() || version.lines().count() != 1 {
        panic!("{} must hold exactly one non-empty version line", version_file.display());
    }

    println!("cargo:rustc-env=SPA_AUTH_VERSION={version}");
}
