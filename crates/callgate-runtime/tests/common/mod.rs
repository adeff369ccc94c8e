//! Shared helpers for callgate-runtime integration tests

#![allow(dead_code)]

use callgate::{CallGate, GateConfig, InvocationObserver, EnvHandle};
use callgate_runtime::{Vm, VmOptions};
use parking_lot::Mutex;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Route runtime logs through the test harness's captured output
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Configuration with every optional check switched on
pub fn checked_config() -> GateConfig {
    GateConfig {
        check_jni: true,
        verify_tiers: true,
        ..GateConfig::default()
    }
}

/// Fresh VM and a gate over it
pub fn setup(config: GateConfig) -> (Arc<Vm>, CallGate<Vm>) {
    setup_with(VmOptions::default(), config)
}

/// Fresh VM with `options` and a gate over it
pub fn setup_with(options: VmOptions, config: GateConfig) -> (Arc<Vm>, CallGate<Vm>) {
    init_tracing();
    let vm = Vm::new(options);
    let gate = vm.gate(config);
    (vm, gate)
}

/// Observer recording begin/end notifications
#[derive(Default)]
pub struct RecordingObserver {
    pub report: bool,
    pub queries: AtomicUsize,
    pub events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new(report: bool) -> Arc<Self> {
        Arc::new(Self {
            report,
            ..Self::default()
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl InvocationObserver for RecordingObserver {
    fn should_report(&self) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.report
    }

    fn notify_begin(&self, env: EnvHandle) {
        self.events.lock().push(format!("begin:{}", env.0));
    }

    fn notify_end(&self, env: EnvHandle) {
        self.events.lock().push(format!("end:{}", env.0));
    }
}

/// Environment variable selecting the scenario a child process runs
pub const FATAL_CASE_ENV: &str = "CALLGATE_FATAL_CASE";

/// Whether this process is the child running `case`
pub fn is_fatal_child(case: &str) -> bool {
    std::env::var(FATAL_CASE_ENV).is_ok_and(|value| value == case)
}

/// Re-run `test_name` in a child process with `case` selected and return
/// its exit success and stderr.
pub fn run_fatal_child(test_name: &str, case: &str) -> (bool, String) {
    let exe = std::env::current_exe().expect("test binary path");
    let output = Command::new(exe)
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env(FATAL_CASE_ENV, case)
        .output()
        .expect("spawn child test process");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}
