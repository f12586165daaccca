// Build script for flutter_rust_bridge code generation
//
// Bindings are generated out of band with the CLI tool:
//   flutter_rust_bridge_codegen generate
//
// The Dart side consumes the functions in src/api.rs and src/api/.

fn main() {
    println!("cargo:rerun-if-changed=src/api.rs");
    println!("cargo:rerun-if-changed=src/api");

    // Android builds link against libc++_shared so Oboe's C++ symbols
    // (__cxa_pure_virtual and friends) resolve on every ABI.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("android") {
        println!("cargo:rustc-link-lib=c++_shared");
    }
}
