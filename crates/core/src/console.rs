//! 콘솔 출력 추상화: 사용자에게 보이는 진행 상황 출력
//!
//! 케이스 제목, `OK`, `Finished VM: x` 같은 사용자용 출력은 모두 [`Console`]을
//! 거칩니다. 실제 실행에서는 stdout/stderr에, 테스트에서는 메모리 버퍼에 씁니다.
//! 진단 로그는 `tracing`이 별도로 처리합니다.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// stdout/stderr 쌍
pub struct Console {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
}

impl Console {
    /// 프로세스 표준 출력/에러에 쓰는 콘솔
    pub fn stdio() -> Self {
        Self {
            out: Box::new(io::stdout()),
            err: Box::new(io::stderr()),
        }
    }

    /// 진행 상황도 stderr로 보내는 콘솔 (stdout을 기계 판독용 출력에 비워 둘 때)
    pub fn stderr() -> Self {
        Self {
            out: Box::new(io::stderr()),
            err: Box::new(io::stderr()),
        }
    }

    /// 출력을 메모리에 담는 콘솔과 그 버퍼
    pub fn capture() -> (Self, CapturedOutput) {
        let captured = CapturedOutput::default();
        let console = Self {
            out: Box::new(captured.out.clone()),
            err: Box::new(captured.err.clone()),
        };
        (console, captured)
    }

    /// 일반 진행 상황 출력
    pub fn out(&mut self) -> &mut dyn Write {
        &mut *self.out
    }

    /// 에러 출력
    pub fn err(&mut self) -> &mut dyn Write {
        &mut *self.err
    }

    /// 두 스트림을 모두 비웁니다.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.err.flush()
    }
}

/// 여러 핸들이 공유하는 메모리 버퍼
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// 지금까지 쓰인 내용을 문자열로 반환합니다.
    pub fn contents(&self) -> String {
        let guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&guard).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// [`Console::capture`]가 돌려주는 stdout/stderr 버퍼
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub out: SharedBuffer,
    pub err: SharedBuffer,
}
