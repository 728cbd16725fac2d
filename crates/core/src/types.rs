//! 도메인 타입: 테스트 결과와 권한 요구사항

use std::fmt;

use serde::{Deserialize, Serialize};

/// 실행 권한 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    /// 슈퍼유저 (euid 0)
    Root,
    /// 일반 사용자
    NonRoot,
}

impl Privilege {
    /// 현재 프로세스의 유효 사용자 ID로 권한을 판별합니다.
    pub fn current() -> Self {
        // SAFETY: geteuid는 항상 성공하며 부작용이 없습니다.
        let euid = unsafe { libc::geteuid() };
        if euid == 0 { Self::Root } else { Self::NonRoot }
    }

    pub fn is_root(self) -> bool {
        self == Self::Root
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::NonRoot => write!(f, "non-root"),
        }
    }
}

/// 테스트 케이스 실패 원인
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureCause {
    /// 마운트가 대기 예산 안에 나타나지 않음
    MountTimeout,
    /// 검증 블록이 에러를 반환하거나 패닉함
    Verification(String),
    /// 언마운트 명령 실패
    Unmount(String),
    /// 서비스 프로세스가 비정상 종료
    ServiceExit(String),
    /// 메모리 검사기가 에러를 보고함
    MemoryErrors,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MountTimeout => write!(f, "mount did not appear in time"),
            Self::Verification(msg) => write!(f, "verification failed: {msg}"),
            Self::Unmount(msg) => write!(f, "failed to unmount: {msg}"),
            Self::ServiceExit(msg) => write!(f, "service exited abnormally: {msg}"),
            Self::MemoryErrors => write!(f, "memory checker reported errors"),
        }
    }
}

/// 테스트 케이스 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// 통과
    Passed,
    /// 건너뜀 (사유 포함)
    Skipped { reason: String },
    /// 실패 (첫 번째 원인과 이후 원인들)
    Failed { causes: Vec<FailureCause> },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// 메모리 검사기 에러가 원인 중에 있는지 확인합니다.
    pub fn has_memory_errors(&self) -> bool {
        match self {
            Self::Failed { causes } => causes.contains(&FailureCause::MemoryErrors),
            _ => false,
        }
    }
}
