//! mountcheck 공통 크레이트
//!
//! 하네스와 VM 러너가 함께 쓰는 에러, 설정, 재시도, 도메인 타입을 제공합니다.

pub mod config;
pub mod console;
pub mod error;
pub mod retry;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, MountcheckError};

// 설정
pub use config::{GeneralConfig, HarnessConfig, MountcheckConfig, VmConfig};

// 콘솔
pub use console::{CapturedOutput, Console, SharedBuffer};

// 재시도
pub use retry::RetryRunner;

// 도메인 타입
pub use types::{FailureCause, Outcome, Privilege};
