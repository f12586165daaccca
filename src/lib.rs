// Hearing Amp Core - Rust audio and audiometry engine
// Real-time multi-band amplification plus the hearing tests that fit it

// Module declarations
pub mod api;
pub mod audio;
pub mod audiometry;
pub mod calibration;
pub mod config;
pub mod context;
pub mod dsp;
pub mod error;
pub mod fitting;
pub mod managers;
pub mod scheduler;
pub mod storage;

// Re-exports for convenience
pub use api::*;

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(target_os = "android")] {
        /// Route tracing output to logcat
        pub fn init_logging() {
            use tracing_subscriber::prelude::*;

            // Logcat layer is optional; without it events are dropped
            let _ = tracing_subscriber::registry()
                .with(tracing_subscriber::filter::LevelFilter::DEBUG)
                .with(tracing_android::layer("HearingAmp").ok())
                .try_init();
        }
    } else {
        /// Install a stderr subscriber honouring `RUST_LOG`; a no-op when one exists
        pub fn init_logging() {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

/// JNI_OnLoad is called when the native library is loaded by Android
/// This function initializes the Android context required by oboe-rs
#[cfg(target_os = "android")]
#[no_mangle]
pub extern "system" fn JNI_OnLoad(vm: jni::JavaVM, _reserved: *mut std::ffi::c_void) -> jni::sys::jint {
    init_logging();

    tracing::info!("JNI_OnLoad called - initializing Android context");

    // SAFETY: the runtime hands us a valid JavaVM pointer; this must run
    // before any Oboe stream is opened
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer() as *mut std::ffi::c_void,
            std::ptr::null_mut(),
        );
    }

    tracing::info!("Android context initialized successfully");

    jni::sys::JNI_VERSION_1_6
}
