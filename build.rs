fn main() {
    println!("cargo:rerun-if-env-changed=DATABASE_URL");
    println!("cargo:rustc-check-cfg=cfg(postgres_tests)");

    // Repository tests against a live database are compiled only when one is configured.
    if std::env::var_os("DATABASE_URL").is_some() {
        println!("cargo:rustc-cfg=postgres_tests");
    }
}
