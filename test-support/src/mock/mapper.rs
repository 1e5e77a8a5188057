//! 用户态映射的 Mock 实现

use std::collections::BTreeMap;

use hal::{ClientId, EngineCode, EngineResult, UserMapper};
use parking_lot::Mutex;

/// 第一个用户态映射地址
const USER_BASE: usize = 0x7f00_0000;

#[derive(Default)]
struct State {
    next: usize,
    live: BTreeMap<usize, (ClientId, usize, usize)>,
    fail_next: bool,
}

/// 解除映射时回调，参数为所属客户端
pub type UnmapHook = Box<dyn Fn(ClientId) + Send + Sync>;

/// Mock 映射器
pub struct MockMapper {
    state: Mutex<State>,
    on_unmap: Mutex<Option<UnmapHook>>,
}

impl MockMapper {
    /// 创建映射器
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next: USER_BASE,
                ..State::default()
            }),
            on_unmap: Mutex::new(None),
        }
    }

    /// 当前存活的映射数
    pub fn live(&self) -> usize {
        self.state.lock().live.len()
    }

    /// 用户态地址对应的物理地址
    pub fn physical_of(&self, user: usize) -> Option<usize> {
        self.state.lock().live.get(&user).map(|&(_, physical, _)| physical)
    }

    /// 让下一次映射失败
    pub fn fail_next(&self) {
        self.state.lock().fail_next = true;
    }

    /// 安装解除映射回调，回调在释放内部锁之后执行
    pub fn set_unmap_hook(&self, hook: UnmapHook) {
        *self.on_unmap.lock() = Some(hook);
    }
}

impl Default for MockMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl UserMapper for MockMapper {
    fn map_user(&self, client: ClientId, physical: usize, size: usize) -> EngineResult<usize> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err(EngineCode(-12));
        }
        let user = state.next;
        state.next += size.div_ceil(4096).max(1) * 4096;
        state.live.insert(user, (client, physical, size));
        Ok(user)
    }

    fn unmap_user(&self, client: ClientId, user: usize, _size: usize) {
        self.state.lock().live.remove(&user);
        if let Some(hook) = self.on_unmap.lock().as_ref() {
            hook(client);
        }
    }
}
