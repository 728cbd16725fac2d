//! Lifecycle tests: TestEnvironment and SuiteRunner against a stand-in
//! service.
//!
//! The service is a small `/bin/sh` script that "mounts" by creating a
//! marker file in the mount directory and exits once the marker is gone.
//! `FakeMounts` reads and removes that marker instead of touching the real
//! mount table.

use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mountcheck_core::{CapturedOutput, Console, FailureCause, HarnessConfig, Outcome, Privilege, RetryRunner};
use mountcheck_harness::{
    EnvError, EnvSettings, SuiteRunner, TestCase, TestEnvironment, VerifyError, WaitSchedule,
    check, check_eq,
};

mod fake {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    use mountcheck_harness::MountPlatform;

    pub const MARKER: &str = ".mounted";

    /// Mount platform backed by a marker file in the mount directory.
    #[derive(Clone, Default)]
    pub struct FakeMounts {
        unmounts: Arc<Mutex<Vec<PathBuf>>>,
        fail_unmount: bool,
    }

    impl FakeMounts {
        pub fn failing_unmount() -> Self {
            Self {
                fail_unmount: true,
                ..Self::default()
            }
        }

        pub fn unmount_calls(&self) -> Vec<PathBuf> {
            self.unmounts.lock().unwrap().clone()
        }
    }

    impl MountPlatform for FakeMounts {
        fn is_mounted(&self, path: &Path) -> io::Result<bool> {
            Ok(path.join(MARKER).exists())
        }

        fn unmount(&self, path: &Path) -> Result<(), String> {
            self.unmounts.lock().unwrap().push(path.to_path_buf());
            if self.fail_unmount {
                return Err("fake unmount refused".to_owned());
            }
            fs::remove_file(path.join(MARKER)).map_err(|e| e.to_string())
        }
    }
}

use fake::FakeMounts;

/// Mounts, records its pid next to the scratch dir, exits 0 on unmount.
const GOOD_SERVICE: &str = r#"#!/bin/sh
for last; do :; done
mnt="$last"
echo $$ > "$mnt/../../service.pid"
echo "service args: $*"
touch "$mnt/.mounted"
while [ -e "$mnt/.mounted" ]; do sleep 0.02; done
echo "service stopping"
exit 0
"#;

/// Never mounts.
const HUNG_SERVICE: &str = r#"#!/bin/sh
echo $$ > "$(dirname "$0")/service.pid"
exec sleep 30
"#;

/// Mounts, then exits 3 on unmount.
const FAILING_EXIT_SERVICE: &str = r#"#!/bin/sh
for last; do :; done
mnt="$last"
touch "$mnt/.mounted"
while [ -e "$mnt/.mounted" ]; do sleep 0.02; done
exit 3
"#;

/// Dies before mounting.
const CRASHING_SERVICE: &str = r#"#!/bin/sh
echo "bad option" >&2
exit 1
"#;

/// Hangs on the first attempt, mounts on the second.
const FLAKY_SERVICE: &str = r#"#!/bin/sh
for last; do :; done
mnt="$last"
if [ ! -e "$mnt/../attempted" ]; then
    touch "$mnt/../attempted"
    exec sleep 30
fi
touch "$mnt/.mounted"
while [ -e "$mnt/.mounted" ]; do sleep 0.02; done
exit 0
"#;

/// Never mounts while polled; mounts only when told to terminate.
const LATE_MOUNT_SERVICE: &str = r#"#!/bin/sh
for last; do :; done
mnt="$last"
sleep 30 &
trap 'touch "$mnt/.mounted"; kill $!; exit 0' TERM
wait
"#;

struct Fixture {
    root: tempfile::TempDir,
    mounts: FakeMounts,
}

impl Fixture {
    fn new() -> Self {
        Self::with_mounts(FakeMounts::default())
    }

    fn with_mounts(mounts: FakeMounts) -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            mounts,
        }
    }

    fn script(&self, body: &str) -> PathBuf {
        let path = self.root.path().join("service.sh");
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn settings(&self, executable: PathBuf) -> EnvSettings {
        let mut settings = EnvSettings::from_config(&HarnessConfig::default(), self.root.path()).unwrap();
        settings.executable = executable;
        settings.privilege = Privilege::Root;
        settings.wait = WaitSchedule {
            initial: Duration::from_millis(5),
            ramp: 2,
            max_sleep: Duration::from_millis(50),
            max_wait: Duration::from_secs(3),
        };
        settings
    }

    fn env(&self, settings: EnvSettings) -> (TestEnvironment<FakeMounts>, CapturedOutput) {
        let (console, captured) = Console::capture();
        (
            TestEnvironment::with_platform(settings, self.mounts.clone(), console),
            captured,
        )
    }

    fn scratch(&self) -> PathBuf {
        self.root.path().join("tmp_test_bindfs")
    }

    fn service_pid(&self) -> libc::pid_t {
        fs::read_to_string(self.root.path().join("service.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }
}

fn process_gone(pid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only probes for existence.
    unsafe { libc::kill(pid, 0) == -1 }
}

fn write_and_read_back(ctx: &mountcheck_harness::CaseContext) -> Result<(), VerifyError> {
    fs::write(ctx.src("file"), "hello")?;
    check(ctx.mnt_dir().is_dir(), "mount point should be a directory")?;
    check_eq(fs::read_to_string(ctx.src("file"))?.as_str(), "hello", "file contents")
}

#[test]
fn passing_case_prints_title_and_ok() {
    let fx = Fixture::new();
    let (mut env, out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));

    let outcome = env.run(&TestCase::new("", write_and_read_back)).unwrap();

    assert_eq!(outcome, Outcome::Passed);
    let stdout = out.out.contents();
    assert!(stdout.starts_with("---  ---\n[    ]\n"), "{stdout}");
    assert!(stdout.ends_with("OK\n"), "{stdout}");
    assert!(out.err.contents().is_empty());
    assert!(!fx.scratch().exists());
    assert_eq!(fx.mounts.unmount_calls().len(), 1);
    assert!(process_gone(fx.service_pid()));
}

#[test]
fn failing_verification_reports_error_and_cleans_up() {
    let fx = Fixture::new();
    let (mut env, out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));

    let case = TestCase::new("-p 0600:u+D", |ctx| {
        check(!ctx.mnt_dir().exists(), "mount point should not exist")
    });
    let outcome = env.run(&case).unwrap();

    match &outcome {
        Outcome::Failed { causes } => {
            assert_eq!(causes.len(), 1);
            assert!(matches!(causes[0], FailureCause::Verification(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(out.out.contents().starts_with("--- -p 0600:u+D ---\n"));
    assert!(!out.out.contents().contains("OK"));
    let stderr = out.err.contents();
    assert!(stderr.contains("ERROR: testcase `-p 0600:u+D' failed"), "{stderr}");
    assert!(stderr.contains("mount point should not exist"), "{stderr}");
    assert!(!fx.scratch().exists());
    assert_eq!(fx.mounts.unmount_calls().len(), 1);
    assert!(process_gone(fx.service_pid()));
}

#[test]
fn panicking_verification_is_caught_and_torn_down_once() {
    let fx = Fixture::new();
    let (mut env, _out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));

    let case = TestCase::new("--chmod-deny", |_| -> Result<(), VerifyError> {
        panic!("verification blew up")
    });
    let outcome = env.run(&case).unwrap();

    match outcome {
        Outcome::Failed { causes } => match &causes[0] {
            FailureCause::Verification(msg) => assert!(msg.contains("verification blew up"), "{msg}"),
            other => panic!("unexpected cause {other:?}"),
        },
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!fx.scratch().exists());
    assert_eq!(fx.mounts.unmount_calls().len(), 1);
}

#[test]
fn mount_timeout_skips_verification_but_cleans_up() {
    let fx = Fixture::new();
    let mut settings = fx.settings(fx.script(HUNG_SERVICE));
    settings.wait.max_wait = Duration::from_millis(150);
    let (mut env, _out) = fx.env(settings);

    let verified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&verified);
    let case = TestCase::new("", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let outcome = env.run(&case).unwrap();

    assert_eq!(
        outcome,
        Outcome::Failed {
            causes: vec![FailureCause::MountTimeout]
        }
    );
    assert_eq!(verified.load(Ordering::SeqCst), 0);
    assert!(fx.mounts.unmount_calls().is_empty());
    assert!(!fx.scratch().exists());
    assert!(process_gone(fx.service_pid()));
}

#[test]
fn setup_retry_absorbs_one_mount_timeout() {
    let fx = Fixture::new();
    let mut settings = fx.settings(fx.script(FLAKY_SERVICE));
    settings.wait.max_wait = Duration::from_millis(150);
    settings.setup_retry = RetryRunner::new(1, Duration::ZERO, Duration::ZERO);
    let (mut env, _out) = fx.env(settings);

    let outcome = env.run(&TestCase::new("", |_| Ok(()))).unwrap();

    assert_eq!(outcome, Outcome::Passed);
    assert_eq!(fx.mounts.unmount_calls().len(), 1);
    assert!(!fx.scratch().exists());
}

#[test]
fn late_mount_is_released_before_the_next_attempt() {
    let fx = Fixture::new();
    let mut settings = fx.settings(fx.script(LATE_MOUNT_SERVICE));
    settings.wait.max_wait = Duration::from_millis(150);
    settings.setup_retry = RetryRunner::new(1, Duration::ZERO, Duration::ZERO);
    let (mut env, _out) = fx.env(settings);

    let verified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&verified);
    let case = TestCase::new("", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let outcome = env.run(&case).unwrap();

    // the second attempt must not mistake the first one's mount for its own
    assert_eq!(
        outcome,
        Outcome::Failed {
            causes: vec![FailureCause::MountTimeout]
        }
    );
    assert_eq!(verified.load(Ordering::SeqCst), 0);
    assert_eq!(fx.mounts.unmount_calls().len(), 2);
    assert!(!fx.scratch().exists());
}

#[test]
fn unmount_failure_fails_case_and_stops_service() {
    let fx = Fixture::with_mounts(FakeMounts::failing_unmount());
    let (mut env, _out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));

    let outcome = env.run(&TestCase::new("", |_| Ok(()))).unwrap();

    assert_eq!(
        outcome,
        Outcome::Failed {
            causes: vec![FailureCause::Unmount("fake unmount refused".to_owned())]
        }
    );
    assert!(!fx.scratch().exists());
    assert!(process_gone(fx.service_pid()));
}

#[test]
fn nonzero_service_exit_fails_case() {
    let fx = Fixture::new();
    let (mut env, _out) = fx.env(fx.settings(fx.script(FAILING_EXIT_SERVICE)));

    let outcome = env.run(&TestCase::new("", |_| Ok(()))).unwrap();

    match outcome {
        Outcome::Failed { causes } => {
            assert_eq!(causes.len(), 1);
            assert!(matches!(&causes[0], FailureCause::ServiceExit(msg) if msg.contains('3')));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!fx.scratch().exists());
}

#[test]
fn service_dying_before_mount_is_reported_quickly() {
    let fx = Fixture::new();
    let (mut env, _out) = fx.env(fx.settings(fx.script(CRASHING_SERVICE)));

    let started = std::time::Instant::now();
    let outcome = env.run(&TestCase::new("--bogus", |_| Ok(()))).unwrap();

    assert!(matches!(
        outcome,
        Outcome::Failed { ref causes } if matches!(causes[0], FailureCause::ServiceExit(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!fx.scratch().exists());
}

#[test]
fn missing_executable_is_fatal_and_leaves_no_scratch_dir() {
    let fx = Fixture::new();
    let (mut env, _out) = fx.env(fx.settings(fx.root.path().join("no-such-service")));

    let err = env.run(&TestCase::new("", |_| Ok(()))).unwrap_err();

    assert!(matches!(err, EnvError::Spawn { .. }), "{err}");
    assert!(!fx.scratch().exists());
    assert!(fx.mounts.unmount_calls().is_empty());
}

#[test]
fn leftover_scratch_dir_is_fatal() {
    let fx = Fixture::new();
    fs::create_dir(fx.scratch()).unwrap();
    let (mut env, _out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));

    let err = env.run(&TestCase::new("", |_| Ok(()))).unwrap_err();

    assert!(matches!(err, EnvError::Setup { .. }), "{err}");
}

#[test]
fn unbalanced_quotes_in_args_are_fatal() {
    let fx = Fixture::new();
    let (mut env, _out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));

    let err = env.run(&TestCase::new("--map='oops", |_| Ok(()))).unwrap_err();

    assert!(matches!(err, EnvError::Args { .. }), "{err}");
    assert!(!fx.scratch().exists());
}

#[test]
fn traced_case_echoes_service_log() {
    let fx = Fixture::new();
    let (mut env, out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));

    let outcome = env.run(&TestCase::new("-u nobody", |_| Ok(())).trace()).unwrap();

    assert_eq!(outcome, Outcome::Passed);
    let stdout = out.out.contents();
    assert!(stdout.contains("--- bindfs.log ---\n"), "{stdout}");
    assert!(stdout.contains("service args: -u nobody -f"), "{stdout}");
    assert!(stdout.contains("service stopping"), "{stdout}");
}

#[test]
fn nonroot_flags_are_added_for_regular_user() {
    let fx = Fixture::new();
    let mut settings = fx.settings(fx.script(GOOD_SERVICE));
    settings.privilege = Privilege::NonRoot;
    let (mut env, out) = fx.env(settings);

    env.run(&TestCase::new("", |_| Ok(())).trace()).unwrap();

    assert!(out.out.contents().contains("-f --no-allow-other "));
}

#[test]
fn root_gets_no_nonroot_flags() {
    let fx = Fixture::new();
    let (mut env, out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));

    env.run(&TestCase::new("", |_| Ok(())).trace()).unwrap();

    assert!(!out.out.contents().contains("--no-allow-other"));
}

#[test]
fn awkward_directory_names_reach_the_service_intact() {
    let fx = Fixture::new();
    let (mut env, _out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));

    let case = TestCase::new("", |ctx| {
        check(ctx.src_dir().ends_with("src dir,1"), "src name")?;
        check(ctx.mnt_dir().ends_with("mnt\ndir"), "mnt name")?;
        check(ctx.mnt(".mounted").exists(), "service saw the mount path")
    })
    .srcdir_name("src dir,1")
    .mntdir_name("mnt\ndir");
    let outcome = env.run(&case).unwrap();

    assert_eq!(outcome, Outcome::Passed);
    assert!(!fx.scratch().exists());
}

#[test]
fn privilege_mismatch_prints_skip() {
    let fx = Fixture::new();
    let mut settings = fx.settings(fx.script(GOOD_SERVICE));
    settings.privilege = Privilege::NonRoot;
    let (mut env, out) = fx.env(settings);

    let outcome = env.run(&TestCase::root("--chown-deny", |_| Ok(()))).unwrap();

    assert_eq!(
        outcome,
        Outcome::Skipped {
            reason: "requires root".to_owned()
        }
    );
    assert_eq!(
        out.out.contents(),
        "--- --chown-deny ---\n[  --chown-deny  ]\nSKIP (requires root)\n"
    );
    assert!(!fx.scratch().exists());
}

#[test]
fn unselected_case_is_silent() {
    let fx = Fixture::new();
    let settings = fx
        .settings(fx.script(GOOD_SERVICE))
        .with_filter(Some(BTreeSet::from(["other".to_owned()])));
    let (mut env, out) = fx.env(settings);

    let outcome = env.run(&TestCase::new("", |_| Ok(()))).unwrap();

    assert!(matches!(outcome, Outcome::Skipped { .. }));
    assert!(out.out.contents().is_empty());
}

#[test]
fn suite_stops_at_first_failure() {
    let fx = Fixture::new();
    let (env, out) = fx.env(fx.settings(fx.script(GOOD_SERVICE)));
    let mut suite = SuiteRunner::new(env);

    let cases = vec![
        TestCase::new("first", |_| Ok(())),
        TestCase::new("second", |_| check(false, "nope")),
        TestCase::new("third", |_| Ok(())),
    ];
    let report = suite.run(&cases).unwrap();

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.passed(), 1);
    assert_eq!(report.failure().map(|r| r.title.as_str()), Some("second"));
    assert_eq!(report.exit_code(), 1);
    assert!(!out.out.contents().contains("--- third ---"));
    assert!(!fx.scratch().exists());
}

#[test]
fn suite_runs_only_selected_cases() {
    let fx = Fixture::new();
    let settings = fx
        .settings(fx.script(GOOD_SERVICE))
        .with_filter(Some(BTreeSet::from(["b".to_owned(), "missing".to_owned()])));
    let (env, out) = fx.env(settings);
    let mut suite = SuiteRunner::new(env);

    let cases = vec![
        TestCase::new("a", |_| check(false, "must not run")),
        TestCase::new("b", |_| Ok(())),
        TestCase::new("c", |_| check(false, "must not run")),
    ];
    assert_eq!(suite.unmatched_names(&cases), vec!["missing".to_owned()]);
    let report = suite.run(&cases).unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].title, "b");
    assert_eq!(report.exit_code(), 0);
    assert_eq!(out.out.contents(), "--- b ---\n[  b  ]\nOK\n");
}
