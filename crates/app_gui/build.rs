use std::env;

fn main() {
    let version = env::var("CHECKYOURMOLE_VERSION")
        .unwrap_or_else(|_| env::var("CARGO_PKG_VERSION").unwrap());
    println!("cargo:rerun-if-env-changed=CHECKYOURMOLE_VERSION");
    println!("cargo:rustc-env=CHECKYOURMOLE_VERSION={version}");
}
