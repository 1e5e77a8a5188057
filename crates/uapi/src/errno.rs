//! 状态码
//!
//! 与 Linux errno 数值保持一致；命令返回时取负值。

pub const EPERM: i32 = 1;
pub const EINTR: i32 = 4;
pub const EIO: i32 = 5;
pub const EBADF: i32 = 9;
pub const EAGAIN: i32 = 11;
pub const ENOMEM: i32 = 12;
pub const EBUSY: i32 = 16;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;
pub const ENOSYS: i32 = 38;
pub const EMSGSIZE: i32 = 90;
pub const ETIMEDOUT: i32 = 110;
pub const EALREADY: i32 = 114;
