//! 用户态映射接口

use crate::engine::EngineResult;
use crate::ids::ClientId;

/// 用户态映射接口
pub trait UserMapper: Send + Sync {
    /// 在客户端地址空间映射一段物理内存，返回用户态地址
    fn map_user(&self, client: ClientId, physical: usize, size: usize) -> EngineResult<usize>;

    /// 撤销用户态映射
    fn unmap_user(&self, client: ClientId, user: usize, size: usize);
}
