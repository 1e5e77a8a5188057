//! 运行时错误类型
//!
//! 可通过 [`CmError::to_errno()`] 转换为命令返回的状态码。

use thiserror::Error;
use uapi::errno;

use crate::platform::EngineCode;

/// 运行时错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CmError {
    /// 参数不合法 (-EINVAL)
    #[error("invalid parameter")]
    InvalidParameter,
    /// 句柄不存在或已失效 (-EBADF)
    #[error("unknown handle")]
    UnknownHandle,
    /// 内存区已被预留 (-EALREADY)
    #[error("memory area already reserved")]
    AlreadyReserved,
    /// 内存区已映射过 (-EEXIST)
    #[error("memory area already mapped")]
    AlreadyMapped,
    /// 调用者没有预留该内存区 (-EPERM)
    #[error("memory area not reserved by caller")]
    NotReserved,
    /// 资源仍在使用 (-EBUSY)
    #[error("resource busy")]
    ResourceBusy,
    /// 内存不足 (-ENOMEM)
    #[error("out of memory")]
    OutOfMemory,
    /// 引擎错误 (-EIO)，附带引擎错误码
    #[error("engine error {0}")]
    Engine(EngineCode),
    /// 等待硬件超时 (-ETIMEDOUT)
    #[error("timed out")]
    Timeout,
    /// 阻塞等待被打断 (-EINTR)
    #[error("interrupted")]
    Interrupted,
    /// 非阻塞操作将阻塞 (-EAGAIN)
    #[error("operation would block")]
    WouldBlock,
    /// 缓冲区不足，附带所需字节数 (-EMSGSIZE)
    #[error("buffer too small, {0} bytes needed")]
    BufferTooSmall(usize),
}

impl From<EngineCode> for CmError {
    fn from(code: EngineCode) -> Self {
        CmError::Engine(code)
    }
}

impl CmError {
    /// 转换为命令返回的状态码（负数）
    pub fn to_errno(&self) -> i32 {
        -match self {
            CmError::InvalidParameter => errno::EINVAL,
            CmError::UnknownHandle => errno::EBADF,
            CmError::AlreadyReserved => errno::EALREADY,
            CmError::AlreadyMapped => errno::EEXIST,
            CmError::NotReserved => errno::EPERM,
            CmError::ResourceBusy => errno::EBUSY,
            CmError::OutOfMemory => errno::ENOMEM,
            CmError::Engine(_) => errno::EIO,
            CmError::Timeout => errno::ETIMEDOUT,
            CmError::Interrupted => errno::EINTR,
            CmError::WouldBlock => errno::EAGAIN,
            CmError::BufferTooSmall(_) => errno::EMSGSIZE,
        }
    }

    /// 引擎错误码（非引擎错误时为 0）
    pub fn engine_code(&self) -> i32 {
        match self {
            CmError::Engine(code) => code.0,
            _ => 0,
        }
    }
}

/// 运行时结果类型
pub type CmResult<T> = Result<T, CmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_is_negative() {
        assert_eq!(CmError::InvalidParameter.to_errno(), -22);
        assert_eq!(CmError::ResourceBusy.to_errno(), -16);
        assert_eq!(CmError::Engine(EngineCode(-7)).to_errno(), -5);
    }

    #[test]
    fn test_engine_code_passthrough() {
        let err: CmError = EngineCode(-42).into();
        assert_eq!(err.engine_code(), -42);
        assert_eq!(CmError::Timeout.engine_code(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CmError::BufferTooSmall(19).to_string(),
            "buffer too small, 19 bytes needed"
        );
    }
}
