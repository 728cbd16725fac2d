//! 설정 관리: mountcheck.toml 파싱 및 런타임 설정
//!
//! [`MountcheckConfig`]는 하네스와 VM 러너 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`MOUNTCHECK_HARNESS_EXECUTABLE=/usr/bin/bindfs` 형식)
//! 3. 설정 파일 (`mountcheck.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # fn example() -> Result<(), mountcheck_core::error::MountcheckError> {
//! use mountcheck_core::config::MountcheckConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = MountcheckConfig::load("mountcheck.toml")?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = MountcheckConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, MountcheckError};

/// 헬퍼 바이너리 위치를 옮기는 환경변수 (`make check`가 설정)
pub const SRCDIR_ENV: &str = "srcdir";

/// mountcheck 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountcheckConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 단일 머신 하네스 설정
    #[serde(default)]
    pub harness: HarnessConfig,
    /// 멀티 타깃 VM 러너 설정
    #[serde(default)]
    pub vm: VmConfig,
}

impl MountcheckConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MountcheckError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 있으면 로드하고, 없으면 기본값에 환경변수 오버라이드만 적용합니다.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, MountcheckError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MountcheckError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MountcheckError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                MountcheckError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, MountcheckError> {
        toml::from_str(toml_str).map_err(|e| {
            MountcheckError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `MOUNTCHECK_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "MOUNTCHECK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "MOUNTCHECK_GENERAL_LOG_FORMAT");

        // Harness
        override_string(&mut self.harness.executable, "MOUNTCHECK_HARNESS_EXECUTABLE");
        override_string(
            &mut self.harness.testdir_name,
            "MOUNTCHECK_HARNESS_TESTDIR_NAME",
        );
        override_string(&mut self.harness.srcdir_name, "MOUNTCHECK_HARNESS_SRCDIR_NAME");
        override_string(&mut self.harness.mntdir_name, "MOUNTCHECK_HARNESS_MNTDIR_NAME");
        override_csv(
            &mut self.harness.nonroot_flags,
            "MOUNTCHECK_HARNESS_NONROOT_FLAGS",
        );
        override_string(
            &mut self.harness.valgrind_tool,
            "MOUNTCHECK_HARNESS_VALGRIND_TOOL",
        );
        override_u64(
            &mut self.harness.wait_initial_ms,
            "MOUNTCHECK_HARNESS_WAIT_INITIAL_MS",
        );
        override_u32(&mut self.harness.wait_ramp, "MOUNTCHECK_HARNESS_WAIT_RAMP");
        override_u64(
            &mut self.harness.wait_max_sleep_ms,
            "MOUNTCHECK_HARNESS_WAIT_MAX_SLEEP_MS",
        );
        override_u64(
            &mut self.harness.wait_max_wait_ms,
            "MOUNTCHECK_HARNESS_WAIT_MAX_WAIT_MS",
        );
        override_u32(
            &mut self.harness.setup_retries,
            "MOUNTCHECK_HARNESS_SETUP_RETRIES",
        );

        // VM
        override_string(&mut self.vm.root, "MOUNTCHECK_VM_ROOT");
        override_string(&mut self.vm.log_file_name, "MOUNTCHECK_VM_LOG_FILE_NAME");
        override_u32(&mut self.vm.up_retries, "MOUNTCHECK_VM_UP_RETRIES");
        override_u64(
            &mut self.vm.up_retry_sleep_ms,
            "MOUNTCHECK_VM_UP_RETRY_SLEEP_MS",
        );
        override_u64(
            &mut self.vm.up_retry_jitter_ms,
            "MOUNTCHECK_VM_UP_RETRY_JITTER_MS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), MountcheckError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.harness.executable.is_empty() {
            return Err(invalid("harness.executable", "must not be empty"));
        }
        validate_dir_name("harness.testdir_name", &self.harness.testdir_name)?;
        validate_dir_name("harness.srcdir_name", &self.harness.srcdir_name)?;
        validate_dir_name("harness.mntdir_name", &self.harness.mntdir_name)?;
        if self.harness.srcdir_name == self.harness.mntdir_name {
            return Err(invalid(
                "harness.mntdir_name",
                "must differ from harness.srcdir_name",
            ));
        }

        // 대기 스케줄 검증
        if self.harness.wait_ramp < 1 {
            return Err(invalid("harness.wait_ramp", "must be at least 1"));
        }
        if self.harness.wait_max_wait_ms == 0 {
            return Err(invalid("harness.wait_max_wait_ms", "must be greater than 0"));
        }
        if self.harness.wait_initial_ms > self.harness.wait_max_sleep_ms {
            return Err(invalid(
                "harness.wait_initial_ms",
                "must not exceed harness.wait_max_sleep_ms",
            ));
        }

        validate_dir_name("vm.log_file_name", &self.vm.log_file_name)?;
        for (field, command) in [
            ("vm.up", &self.vm.up),
            ("vm.sync", &self.vm.sync),
            ("vm.test", &self.vm.test),
            ("vm.halt", &self.vm.halt),
        ] {
            if command.first().is_none_or(|program| program.is_empty()) {
                return Err(invalid(field, "command must not be empty"));
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 단일 머신 하네스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// 테스트 대상 서비스 실행 파일 (상대 경로는 `srcdir` 기준)
    pub executable: String,
    /// 스크래치 디렉토리 이름
    pub testdir_name: String,
    /// 소스 쪽 하위 디렉토리 기본 이름
    pub srcdir_name: String,
    /// 마운트 쪽 하위 디렉토리 기본 이름
    pub mntdir_name: String,
    /// 서비스를 포그라운드로 유지하는 플래그
    pub foreground_flag: String,
    /// root가 아닐 때 추가하는 플래그
    pub nonroot_flags: Vec<String>,
    /// 서비스가 남기는 로그 파일 이름
    pub log_file_name: String,
    /// valgrind 도구 이름
    pub valgrind_tool: String,
    /// 마운트 대기 초기 간격 (밀리초)
    pub wait_initial_ms: u64,
    /// 마운트 대기 간격 증가 배수
    pub wait_ramp: u32,
    /// 마운트 대기 최대 간격 (밀리초)
    pub wait_max_sleep_ms: u64,
    /// 마운트 대기 총 예산 (밀리초)
    pub wait_max_wait_ms: u64,
    /// 마운트 타임아웃 시 서비스 재기동 횟수
    pub setup_retries: u32,
    /// 재기동 대기 기본 간격 (밀리초)
    pub setup_retry_sleep_ms: u64,
    /// 재기동 대기 지터 폭 (밀리초)
    pub setup_retry_jitter_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            executable: "../src/bindfs".to_owned(),
            testdir_name: "tmp_test_bindfs".to_owned(),
            srcdir_name: "src".to_owned(),
            mntdir_name: "mnt".to_owned(),
            foreground_flag: "-f".to_owned(),
            nonroot_flags: vec!["--no-allow-other".to_owned()],
            log_file_name: "bindfs.log".to_owned(),
            valgrind_tool: "memcheck".to_owned(),
            wait_initial_ms: 10,
            wait_ramp: 2,
            wait_max_sleep_ms: 500,
            wait_max_wait_ms: 5000,
            setup_retries: 0,
            setup_retry_sleep_ms: 500,
            setup_retry_jitter_ms: 200,
        }
    }
}

impl HarnessConfig {
    /// 실행 파일 경로를 결정합니다.
    ///
    /// 상대 경로이고 `srcdir`가 주어지면 그 아래에서 찾습니다.
    pub fn resolve_executable(&self, srcdir: Option<&Path>) -> PathBuf {
        let exe = Path::new(&self.executable);
        match srcdir {
            Some(dir) if exe.is_relative() => dir.join(exe),
            _ => exe.to_path_buf(),
        }
    }

    /// `srcdir` 환경변수를 반영하여 실행 파일 경로를 결정합니다.
    pub fn executable_from_env(&self) -> PathBuf {
        let srcdir = std::env::var_os(SRCDIR_ENV).map(PathBuf::from);
        self.resolve_executable(srcdir.as_deref())
    }

    pub fn wait_initial(&self) -> Duration {
        Duration::from_millis(self.wait_initial_ms)
    }

    pub fn wait_max_sleep(&self) -> Duration {
        Duration::from_millis(self.wait_max_sleep_ms)
    }

    pub fn wait_max_wait(&self) -> Duration {
        Duration::from_millis(self.wait_max_wait_ms)
    }
}

/// 멀티 타깃 VM 러너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// 타깃 디렉토리들이 있는 루트
    pub root: String,
    /// 타깃 디렉토리임을 나타내는 파일
    pub marker_file: String,
    /// 타깃별 로그 파일 이름
    pub log_file_name: String,
    /// 기동 단계 추가 시도 횟수
    pub up_retries: u32,
    /// 기동 재시도 기본 대기 (밀리초)
    pub up_retry_sleep_ms: u64,
    /// 기동 재시도 지터 폭 (밀리초)
    pub up_retry_jitter_ms: u64,
    /// 기동 명령
    pub up: Vec<String>,
    /// 소스 동기화 명령
    pub sync: Vec<String>,
    /// 원격 테스트 스위트 실행 명령
    pub test: Vec<String>,
    /// 종료 명령
    pub halt: Vec<String>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            root: "vagrant".to_owned(),
            marker_file: "Vagrantfile".to_owned(),
            log_file_name: "test.log".to_owned(),
            up_retries: 3,
            up_retry_sleep_ms: 1000,
            up_retry_jitter_ms: 1000,
            up: command(&["vagrant", "up"]),
            sync: command(&["vagrant", "rsync"]),
            test: command(&[
                "vagrant",
                "ssh",
                "-c",
                "cd /bindfs && sudo rm -Rf tests/tmp_test_bindfs && ./configure && make clean && make && make check && sudo make check",
            ]),
            halt: command(&["vagrant", "halt"]),
        }
    }
}

impl VmConfig {
    pub fn up_retry_sleep(&self) -> Duration {
        Duration::from_millis(self.up_retry_sleep_ms)
    }

    pub fn up_retry_jitter(&self) -> Duration {
        Duration::from_millis(self.up_retry_jitter_ms)
    }
}

fn command(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_owned()).collect()
}

fn invalid(field: &str, reason: impl Into<String>) -> MountcheckError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn validate_dir_name(field: &str, name: &str) -> Result<(), MountcheckError> {
    if name.is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if name.contains('/') || name == "." || name == ".." {
        return Err(invalid(field, "must be a single path component"));
    }
    Ok(())
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
