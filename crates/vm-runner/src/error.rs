//! VM 러너 에러 타입
//!
//! [`VmError`]는 타깃 하나의 파이프라인을 중단시키는 에러입니다.
//! 원격 테스트 단계의 실패는 에러가 아니라 결과로 기록됩니다.

use std::path::PathBuf;

/// VM 러너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// 타깃 루트 디렉토리를 읽을 수 없음
    #[error("failed to scan target directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 타깃 로그 파일 열기 실패
    #[error("failed to open log {path}: {source}")]
    LogOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 단계 명령 실행 자체가 불가능함
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// 단계 명령이 0이 아닌 상태로 종료됨
    #[error("{command} failed")]
    StepFailed { command: String },

    /// 단계 명령이 비어 있음
    #[error("step '{label}' has no command")]
    EmptyCommand { label: String },

    /// 로그 쓰기/읽기 실패
    #[error("log io error: {0}")]
    Log(#[from] std::io::Error),
}
