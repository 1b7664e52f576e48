use super::*;
use async_trait::async_trait;

type Log = Arc<Mutex<Vec<String>>>;

/// Kernel that records every lifecycle call into a shared log.
struct Recorder {
    name: String,
    log: Log,
}

impl Recorder {
    fn new(name: &str, log: &Log) -> Arc<dyn Kernel> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
        })
    }

    fn record(&self, step: &str) {
        self.log.lock().push(format!("{step} {}", self.name));
    }
}

#[async_trait]
impl Kernel for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, _supervisor: &Supervisor) -> Result<(), KernelError> {
        self.record("init");
        Ok(())
    }

    async fn start(&self, _supervisor: &Supervisor) -> Result<(), KernelError> {
        self.record("start");
        Ok(())
    }

    async fn stop(&self, _ctx: StopContext) -> Result<(), KernelError> {
        self.record("stop");
        Ok(())
    }
}

fn test_supervisor() -> Supervisor {
    Supervisor::builder()
        .vars([("APP_NAME", "supervisor-tests"), ("APP_ENV", "test")])
        .build()
}

fn push_label(supervisor: &Supervisor, label: &'static str, log: &Log) {
    let log = log.clone();
    supervisor.add_stop_hook(label, move |_ctx| {
        let log = log.clone();
        async move {
            log.lock().push(label.to_string());
            Ok(())
        }
    });
}

#[test]
fn test_bootstrap_is_lazy() {
    let supervisor = test_supervisor();
    assert_eq!(supervisor.state(), SupervisorState::Created);

    supervisor.base_config().unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Ready);
}

#[test]
fn test_base_config_and_location() {
    let supervisor = Supervisor::builder()
        .vars([
            ("APP_NAME", "orders"),
            ("APP_ENV", "production"),
            ("TIMEZONE", "Europe/Berlin"),
            ("DEBUG", "true"),
        ])
        .build();

    let config = supervisor.base_config().unwrap();
    assert_eq!(config.app_name, "orders");
    assert!(config.debug);
    assert_eq!(supervisor.location().unwrap(), Some(chrono_tz::Europe::Berlin));

    // Both are published through the container.
    let resolved = supervisor.container().resolve::<BaseConfig>().unwrap();
    assert!(Arc::ptr_eq(&resolved, &config));
    assert_eq!(
        *supervisor.container().resolve::<Tz>().unwrap(),
        chrono_tz::Europe::Berlin
    );
}

#[test]
fn test_no_timezone_means_no_location() {
    let supervisor = test_supervisor();
    assert_eq!(supervisor.location().unwrap(), None);
    assert!(!supervisor.container().contains::<Tz>());
}

#[test]
fn test_shutdown_timeout_sources() {
    let supervisor = Supervisor::builder().vars([("SHUTDOWN_TIMEOUT", "5")]).build();
    assert_eq!(supervisor.shutdown_timeout(), Duration::from_secs(30));
    supervisor.base_config().unwrap();
    assert_eq!(supervisor.shutdown_timeout(), Duration::from_secs(5));

    let overridden = Supervisor::builder()
        .vars([("SHUTDOWN_TIMEOUT", "5")])
        .shutdown_timeout(Duration::from_millis(250))
        .build();
    overridden.base_config().unwrap();
    assert_eq!(overridden.shutdown_timeout(), Duration::from_millis(250));
}

#[tokio::test]
async fn test_bootstrap_failure_is_cached() {
    let supervisor = Supervisor::builder().vars([("DEBUG", "maybe")]).build();
    let log = Log::default();

    let register = supervisor
        .register_kernel(Recorder::new("db", &log))
        .unwrap_err();
    let init = supervisor.init_kernel("db").await.unwrap_err();
    let run = supervisor.run_kernel("db").await.unwrap_err();

    assert!(matches!(register, SupervisorError::Bootstrap(_)));
    assert_eq!(register.to_string(), init.to_string());
    assert_eq!(register.to_string(), run.to_string());
    assert!(register.to_string().contains("DEBUG"));
    assert_eq!(supervisor.state(), SupervisorState::Failed);
    assert!(supervisor.kernel_names().is_empty());
    assert!(log.lock().is_empty());
}

#[test]
fn test_unknown_timezone_fails_bootstrap() {
    let supervisor = Supervisor::builder()
        .vars([("TIMEZONE", "Mars/Olympus")])
        .build();

    let err = supervisor.location().unwrap_err();
    match err {
        SupervisorError::Bootstrap(source) => {
            assert!(matches!(*source, ConfigError::UnknownTimezone(ref tz) if tz == "Mars/Olympus"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(supervisor.base_config().is_err());
}

#[tokio::test]
async fn test_stop_hooks_run_in_reverse() {
    let supervisor = test_supervisor();
    let log = Log::default();
    for label in ["A", "B", "C"] {
        push_label(&supervisor, label, &log);
    }

    supervisor.cancel();
    let reason = supervisor.wait_for_shutdown().await;

    assert!(matches!(reason, ShutdownReason::Cancelled));
    assert_eq!(*log.lock(), vec!["C", "B", "A"]);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn test_first_failure_wins() {
    let supervisor = test_supervisor();

    supervisor.fail(KernelError::Custom("e1".to_string()));
    supervisor.fail(KernelError::Custom("e2".to_string()));
    assert!(supervisor.is_cancelled());

    let reason = supervisor.wait_for_shutdown().await;
    let failure = reason.failure().expect("shutdown caused by a failure");
    assert_eq!(failure.to_string(), "e1");
}

#[tokio::test]
async fn test_fail_from_kernel_task_triggers_shutdown() {
    let supervisor = test_supervisor();
    let waiter = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.wait_for_shutdown().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    supervisor.fail(KernelError::Custom("worker crashed".to_string()));

    let reason = waiter.await.unwrap();
    assert_eq!(reason.to_string(), "fatal error: worker crashed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_wait_shares_one_sequence() {
    let supervisor = test_supervisor();
    let log = Log::default();
    push_label(&supervisor, "only", &log);

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.wait_for_shutdown().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    supervisor.cancel();

    for waiter in waiters {
        assert!(matches!(waiter.await.unwrap(), ShutdownReason::Cancelled));
    }
    let late = supervisor.wait_for_shutdown().await;
    assert!(matches!(late, ShutdownReason::Cancelled));
    assert_eq!(*log.lock(), vec!["only"]);
}

#[tokio::test]
async fn test_init_all_run_all_then_shutdown() {
    let supervisor = test_supervisor();
    let log = Log::default();
    supervisor
        .register_kernels([
            Recorder::new("db", &log),
            Recorder::new("cache", &log),
            Recorder::new("http", &log),
        ])
        .unwrap();

    supervisor.init_all().await.unwrap();
    supervisor.run_all().await.unwrap();
    assert_eq!(supervisor.kernel_phase("http"), Some(KernelPhase::Running));

    supervisor.cancel();
    supervisor.wait_for_shutdown().await;

    assert_eq!(
        *log.lock(),
        vec![
            "init db",
            "init cache",
            "init http",
            "start db",
            "start cache",
            "start http",
            "stop http",
            "stop cache",
            "stop db",
        ]
    );
}

#[tokio::test]
async fn test_run_all_requires_init() {
    let supervisor = test_supervisor();
    let log = Log::default();
    supervisor.register_kernel(Recorder::new("db", &log)).unwrap();

    let err = supervisor.run_all().await.unwrap_err();
    assert!(matches!(err, SupervisorError::NotInitialized(ref n) if n == "db"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_budget_is_shared() {
    let supervisor = Supervisor::builder()
        .vars([("APP_NAME", "budget")])
        .shutdown_timeout(Duration::from_millis(100))
        .build();
    let log = Log::default();

    push_label(&supervisor, "first", &log);
    supervisor.add_stop_hook("stuck", |_ctx| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    });

    supervisor.cancel();
    supervisor.wait_for_shutdown().await;

    assert_eq!(*log.lock(), vec!["first"]);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn test_failing_hook_does_not_block_others() {
    let supervisor = test_supervisor();
    let log = Log::default();

    push_label(&supervisor, "first", &log);
    supervisor.add_stop_hook("broken", |_ctx| async {
        Err(KernelError::ShutdownFailed("flush failed".to_string()))
    });

    supervisor.cancel();
    supervisor.wait_for_shutdown().await;

    assert_eq!(*log.lock(), vec!["first"]);
}

#[test]
fn test_debug_output() {
    let supervisor = test_supervisor();
    let debug = format!("{:?}", supervisor);
    assert!(debug.contains("Supervisor"));
    assert!(debug.contains("Created"));
}

#[tokio::test]
async fn test_bootstrap_not_retried_after_env_file_fixed() {
    let dir = tempfile::tempdir().unwrap();
    let env_file = dir.path().join(".env");
    std::fs::write(&env_file, "APP_NAME=orders\nDEBUG=maybe\n").unwrap();

    let supervisor = Supervisor::builder().env_file(&env_file, true).build();
    let log = Log::default();

    let first = supervisor
        .register_kernel(Recorder::new("db", &log))
        .unwrap_err();
    assert!(matches!(first, SupervisorError::Bootstrap(_)));

    // A valid file would now bootstrap fine, but the first outcome sticks.
    std::fs::write(&env_file, "APP_NAME=orders\nDEBUG=true\n").unwrap();

    let second = supervisor
        .register_kernel(Recorder::new("db", &log))
        .unwrap_err();
    let init = supervisor.init_kernel("db").await.unwrap_err();
    assert!(matches!(second, SupervisorError::Bootstrap(_)));
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(first.to_string(), init.to_string());
    assert!(supervisor.base_config().is_err());
    assert_eq!(supervisor.state(), SupervisorState::Failed);

    let fresh = Supervisor::builder().env_file(&env_file, true).build();
    assert!(fresh.base_config().unwrap().debug);
}

#[tokio::test]
async fn test_hook_added_during_shutdown_runs() {
    let supervisor = test_supervisor();
    let log = Log::default();
    push_label(&supervisor, "early", &log);

    // Taken on first call so the hook does not keep the supervisor alive.
    let registrar = Arc::new(Mutex::new(Some(supervisor.clone())));
    let late_log = log.clone();
    supervisor.add_stop_hook("registrar", move |_ctx| {
        let registrar = registrar.lock().take();
        let log = late_log.clone();
        async move {
            if let Some(supervisor) = registrar {
                push_label(&supervisor, "late", &log);
            }
            Ok(())
        }
    });

    supervisor.cancel();
    supervisor.wait_for_shutdown().await;

    assert_eq!(*log.lock(), vec!["early", "late"]);
    assert_eq!(supervisor.stop_hook_count(), 3);
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
}
