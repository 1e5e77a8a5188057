//! 消息通道登记与分发
//!
//! 每个打开的通道对应一个 [`ChannelEntry`]，持有按优先级排序的消息队列
//! （同优先级先进先出）和绑定到它的 skeleton 句柄集合。
//!
//! # 结构锁
//!
//! [`ChannelRegistry`] 的通道表和绑定表放在同一把读写锁下：
//! 打开/关闭/绑定/解绑取写锁，分发取读锁，因此分发过程中通道不会被释放。
//! 加锁顺序固定为 结构锁 → 通道内部锁，从不反向。
//!
//! # 关闭与绑定
//!
//! 关闭通道时如果仍有绑定，通道只进入 `Closed` 状态并清空队列，之后到达的
//! 消息被丢弃；最后一个绑定解除时通道才从登记表中移除。

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use sync::RwLock;
use uapi::cmd::ChannelFlags;
use uapi::message::{Message, ServiceEvent};
use uapi::{ChannelId, ComponentHandle, Priority, SkeletonHandle};

use crate::error::{CmError, CmResult};
use crate::platform::ClientId;
use crate::process::ProcessEntry;

/// 通道状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// 正常收发
    Open,
    /// 已关闭，不再接收新消息
    Closed,
}

/// 一次消息读取的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// 读到一条消息
    Message(Message),
    /// 非阻塞读取时队列为空
    WouldBlock,
    /// 通道已关闭
    Closed,
    /// 通道被冲刷（每次冲刷只报告一次）
    Flushed,
}

struct Queued {
    message: Message,
    binding: Option<SkeletonHandle>,
}

/// 按优先级分档的消息队列
struct MessageQueue {
    levels: [VecDeque<Queued>; Priority::LEVELS],
}

impl MessageQueue {
    fn new() -> Self {
        Self {
            levels: Default::default(),
        }
    }

    fn len(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    fn push(&mut self, priority: Priority, item: Queued) {
        self.levels[priority.index()].push_back(item);
    }

    fn front(&self) -> Option<&Queued> {
        self.levels.iter().rev().find_map(VecDeque::front)
    }

    fn pop(&mut self) -> Option<Queued> {
        self.levels.iter_mut().rev().find_map(VecDeque::pop_front)
    }

    fn purge(&mut self, handle: SkeletonHandle) -> usize {
        let before = self.len();
        for level in &mut self.levels {
            level.retain(|q| q.binding != Some(handle));
        }
        before - self.len()
    }

    fn clear(&mut self) -> usize {
        let n = self.len();
        self.levels.iter_mut().for_each(VecDeque::clear);
        n
    }
}

struct ChannelInner {
    state: ChannelState,
    queue: MessageQueue,
    bindings: BTreeSet<SkeletonHandle>,
    flush_pending: bool,
    interrupt_generation: u64,
}

enum Next<T> {
    Item(T),
    WouldBlock,
    Closed,
    Flushed,
}

/// 一个消息通道
pub struct ChannelEntry {
    id: ChannelId,
    client: ClientId,
    flags: ChannelFlags,
    limit: usize,
    process: Weak<ProcessEntry>,
    inner: Mutex<ChannelInner>,
    readable: Condvar,
}

impl ChannelEntry {
    /// 通道编号
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// 所属客户端
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// 打开标志
    pub fn flags(&self) -> ChannelFlags {
        self.flags
    }

    /// 所属进程（进程已销毁时为 `None`）
    pub fn process(&self) -> Option<Arc<ProcessEntry>> {
        self.process.upgrade()
    }

    /// 当前状态
    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    /// 队列中的消息数
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// 绑定到该通道的 skeleton 数量
    pub fn binding_count(&self) -> usize {
        self.inner.lock().bindings.len()
    }

    /// 放入一条消息并唤醒一个读者
    ///
    /// 通道已关闭或队列已满时丢弃消息并返回 `false`，从不阻塞调用者。
    pub fn enqueue(
        &self,
        message: Message,
        priority: Priority,
        binding: Option<SkeletonHandle>,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == ChannelState::Closed {
            warn!("cm: channel {}: closed, dropping message", self.id.0);
            return false;
        }
        if inner.queue.len() >= self.limit {
            warn!(
                "cm: channel {}: queue full ({}), dropping message",
                self.id.0, self.limit
            );
            return false;
        }
        inner.queue.push(priority, Queued { message, binding });
        drop(inner);
        self.readable.notify_one();
        true
    }

    fn next<T>(
        &self,
        blocking: bool,
        mut take: impl FnMut(&mut MessageQueue) -> CmResult<Option<T>>,
    ) -> CmResult<Next<T>> {
        let mut inner = self.inner.lock();
        let generation = inner.interrupt_generation;
        loop {
            if inner.flush_pending {
                inner.flush_pending = false;
                return Ok(Next::Flushed);
            }
            if inner.state == ChannelState::Closed {
                return Ok(Next::Closed);
            }
            if let Some(item) = take(&mut inner.queue)? {
                return Ok(Next::Item(item));
            }
            if !blocking || self.flags.contains(ChannelFlags::NONBLOCK) {
                return Ok(Next::WouldBlock);
            }
            if inner.interrupt_generation != generation {
                return Err(CmError::Interrupted);
            }
            self.readable.wait(&mut inner);
        }
    }

    /// 读取一条消息
    ///
    /// 以 [`ChannelFlags::NONBLOCK`] 打开的通道总是按非阻塞方式读取。
    /// 阻塞模式下等待直到有消息、通道被冲刷或关闭；等待被
    /// [`interrupt_readers`](Self::interrupt_readers) 打断时返回
    /// [`CmError::Interrupted`]。
    pub fn read_message(&self, blocking: bool) -> CmResult<ReadOutcome> {
        let next = self.next(blocking, |queue| Ok(queue.pop().map(|q| q.message)))?;
        Ok(match next {
            Next::Item(message) => ReadOutcome::Message(message),
            Next::WouldBlock => ReadOutcome::WouldBlock,
            Next::Closed => ReadOutcome::Closed,
            Next::Flushed => ReadOutcome::Flushed,
        })
    }

    /// 以字节流方式读取一条编码后的消息，返回写入的字节数
    ///
    /// 缓冲区小于下一条消息时返回 [`CmError::BufferTooSmall`]，消息保留在队列中。
    /// 通道关闭或被冲刷时返回 0。
    pub fn read(&self, buf: &mut [u8], blocking: bool) -> CmResult<usize> {
        let next = self.next(blocking, |queue| {
            let Some(front) = queue.front() else {
                return Ok(None);
            };
            let need = front.message.encoded_len();
            if buf.len() < need {
                return Err(CmError::BufferTooSmall(need));
            }
            let Some(queued) = queue.pop() else {
                return Ok(None);
            };
            queued
                .message
                .encode(buf)
                .map(Some)
                .map_err(|e| CmError::BufferTooSmall(e.0))
        })?;
        match next {
            Next::Item(n) => Ok(n),
            Next::WouldBlock => Err(CmError::WouldBlock),
            Next::Closed | Next::Flushed => Ok(0),
        }
    }

    /// 冲刷通道：唤醒所有读者，下一次读取返回 [`ReadOutcome::Flushed`]
    ///
    /// 队列中已有的消息保留。
    pub fn flush(&self) {
        self.inner.lock().flush_pending = true;
        self.readable.notify_all();
    }

    /// 打断当前阻塞的读者，使其返回 [`CmError::Interrupted`]
    pub fn interrupt_readers(&self) {
        self.inner.lock().interrupt_generation += 1;
        self.readable.notify_all();
    }

    /// 标记关闭并清空队列，返回剩余绑定数
    fn mark_closed(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.state = ChannelState::Closed;
        let dropped = inner.queue.clear();
        let remaining = inner.bindings.len();
        drop(inner);
        self.readable.notify_all();
        if dropped > 0 {
            debug!("cm: channel {}: dropped {} queued message(s)", self.id.0, dropped);
        }
        remaining
    }
}

/// 通道句柄
///
/// 可以在多个读者之间克隆共享；关闭通过 [`ChannelRegistry::close`] 完成。
#[derive(Clone)]
pub struct ChannelHandle {
    entry: Arc<ChannelEntry>,
}

impl Deref for ChannelHandle {
    type Target = ChannelEntry;

    fn deref(&self) -> &ChannelEntry {
        &self.entry
    }
}

/// DSP 回调句柄到通道的绑定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkeletonBinding {
    /// DSP 侧回调句柄
    pub handle: SkeletonHandle,
    /// 接收回调的通道
    pub channel: ChannelId,
    /// 所属客户端
    pub client: ClientId,
    /// 发起回调的 DSP 组件
    pub component: ComponentHandle,
    /// 回调消息优先级
    pub priority: Priority,
    /// 用户上下文，随消息原样返回
    pub context: u64,
}

struct Binding {
    info: SkeletonBinding,
    channel: Arc<ChannelEntry>,
}

#[derive(Default)]
struct Structure {
    channels: BTreeMap<ChannelId, Arc<ChannelEntry>>,
    bindings: HashMap<SkeletonHandle, Binding>,
}

/// 通道登记表
pub struct ChannelRegistry {
    structure: RwLock<Structure>,
    next_channel: AtomicU64,
    next_skeleton: AtomicU64,
    queue_limit: usize,
}

impl ChannelRegistry {
    /// 创建登记表，`queue_limit` 为单个通道的队列上限
    pub fn new(queue_limit: usize) -> Self {
        Self {
            structure: RwLock::new(Structure::default()),
            next_channel: AtomicU64::new(1),
            next_skeleton: AtomicU64::new(1),
            queue_limit,
        }
    }

    /// 为进程打开一个通道
    pub fn open(&self, process: &Arc<ProcessEntry>, flags: ChannelFlags) -> ChannelHandle {
        let id = ChannelId(self.next_channel.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(ChannelEntry {
            id,
            client: process.client(),
            flags,
            limit: self.queue_limit,
            process: Arc::downgrade(process),
            inner: Mutex::new(ChannelInner {
                state: ChannelState::Open,
                queue: MessageQueue::new(),
                bindings: BTreeSet::new(),
                flush_pending: false,
                interrupt_generation: 0,
            }),
            readable: Condvar::new(),
        });
        self.structure.write().channels.insert(id, entry.clone());
        debug!("cm: {}: opened channel {}", process.client(), id.0);
        ChannelHandle { entry }
    }

    /// 按编号查找仍在登记表中的通道
    pub fn lookup(&self, id: ChannelId) -> Option<ChannelHandle> {
        self.structure
            .read()
            .channels
            .get(&id)
            .map(|entry| ChannelHandle {
                entry: entry.clone(),
            })
    }

    /// 登记表中的通道数（包括仍有绑定的已关闭通道）
    pub fn channel_count(&self) -> usize {
        self.structure.read().channels.len()
    }

    /// 某个客户端在登记表中的通道数
    pub fn channels_of(&self, client: ClientId) -> usize {
        self.structure
            .read()
            .channels
            .values()
            .filter(|c| c.client == client)
            .count()
    }

    /// 绑定总数
    pub fn binding_count(&self) -> usize {
        self.structure.read().bindings.len()
    }

    /// 关闭通道，唤醒所有阻塞的读者
    ///
    /// 没有剩余绑定时通道从登记表移除；否则保留到最后一个绑定解除。
    pub fn close(&self, channel: &ChannelHandle) -> CmResult<()> {
        let mut structure = self.structure.write();
        if !structure.channels.contains_key(&channel.id)
            || channel.state() == ChannelState::Closed
        {
            return Err(CmError::UnknownHandle);
        }
        let remaining = channel.mark_closed();
        if remaining == 0 {
            structure.channels.remove(&channel.id);
            debug!("cm: {}: channel {} closed", channel.client, channel.id.0);
        } else {
            debug!(
                "cm: {}: channel {} closed with {} binding(s) left",
                channel.client, channel.id.0, remaining
            );
        }
        Ok(())
    }

    /// 把 DSP 回调绑定到客户端自己的一个打开的通道
    pub fn bind(
        &self,
        client: ClientId,
        channel: ChannelId,
        component: ComponentHandle,
        priority: Priority,
        context: u64,
    ) -> CmResult<SkeletonBinding> {
        let mut structure = self.structure.write();
        let entry = structure
            .channels
            .get(&channel)
            .filter(|c| c.client == client)
            .cloned()
            .ok_or(CmError::UnknownHandle)?;
        let mut inner = entry.inner.lock();
        if inner.state == ChannelState::Closed {
            return Err(CmError::UnknownHandle);
        }
        let handle = SkeletonHandle(self.next_skeleton.fetch_add(1, Ordering::Relaxed));
        inner.bindings.insert(handle);
        drop(inner);

        let info = SkeletonBinding {
            handle,
            channel,
            client,
            component,
            priority,
            context,
        };
        structure.bindings.insert(
            handle,
            Binding {
                info,
                channel: entry,
            },
        );
        Ok(info)
    }

    /// 查询绑定
    pub fn binding(&self, handle: SkeletonHandle) -> Option<SkeletonBinding> {
        self.structure.read().bindings.get(&handle).map(|b| b.info)
    }

    /// 解除绑定，先清除队列中引用它的消息
    ///
    /// 所在通道已关闭且没有其他绑定时一并移除通道。
    pub fn unbind(&self, client: ClientId, handle: SkeletonHandle) -> CmResult<SkeletonBinding> {
        let mut structure = self.structure.write();
        match structure.bindings.get(&handle) {
            Some(b) if b.info.client == client => {}
            _ => return Err(CmError::UnknownHandle),
        }
        let Some(binding) = structure.bindings.remove(&handle) else {
            return Err(CmError::UnknownHandle);
        };
        let channel = &binding.channel;
        let mut inner = channel.inner.lock();
        inner.bindings.remove(&handle);
        let purged = inner.queue.purge(handle);
        let release = inner.state == ChannelState::Closed && inner.bindings.is_empty();
        drop(inner);

        if purged > 0 {
            debug!(
                "cm: channel {}: purged {} message(s) of skeleton {}",
                channel.id.0, purged, handle.0
            );
        }
        if release {
            structure.channels.remove(&channel.id);
            debug!("cm: channel {} released after last unbind", channel.id.0);
        }
        Ok(binding.info)
    }

    /// 移除某个客户端的全部绑定和通道（进程销毁时调用）
    ///
    /// 返回移除的通道数。
    pub fn release_client(&self, client: ClientId) -> usize {
        let mut structure = self.structure.write();
        structure.bindings.retain(|_, b| b.info.client != client);

        let ids = structure
            .channels
            .values()
            .filter(|c| c.client == client)
            .map(|c| c.id)
            .collect::<Vec<_>>();
        for id in &ids {
            if let Some(channel) = structure.channels.remove(id) {
                channel.mark_closed();
                channel.inner.lock().bindings.clear();
            }
        }
        ids.len()
    }

    /// 把服务事件复制给每个打开的通道，返回收到事件的通道数
    ///
    /// 崩溃事件只有第一个接收它的通道（最早打开的）带有转储标志。
    pub fn dispatch_to_all(&self, event: &ServiceEvent) -> usize {
        let structure = self.structure.read();
        let mut delivered = 0;
        let mut dump_assigned = false;
        for channel in structure.channels.values() {
            if channel.state() != ChannelState::Open {
                continue;
            }
            let mut copy = event.clone();
            let carries_dump = match &mut copy {
                ServiceEvent::Panic { capture_dump, .. } => {
                    *capture_dump = !dump_assigned;
                    !dump_assigned
                }
                _ => false,
            };
            if channel.enqueue(Message::Service(copy), Priority::Urgent, None) {
                delivered += 1;
                dump_assigned |= carries_dump;
            }
        }
        if let ServiceEvent::Panic { core, reason, .. } = event {
            info!(
                "cm: core {} panic (reason {:#x}) reported to {} channel(s)",
                core.0, reason, delivered
            );
        }
        delivered
    }

    /// 把接口回调投递到绑定的通道
    ///
    /// 句柄未知或通道拒收时丢弃并记录日志，返回是否入队。
    pub fn dispatch_callback(&self, handle: SkeletonHandle, method: u32, payload: Vec<u8>) -> bool {
        let structure = self.structure.read();
        let Some(binding) = structure.bindings.get(&handle) else {
            warn!("cm: callback for unknown skeleton {}, dropped", handle.0);
            return false;
        };
        let message = Message::InterfaceCallback {
            context: binding.info.context,
            method,
            payload,
        };
        binding
            .channel
            .enqueue(message, binding.info.priority, Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use uapi::CoreId;

    const CLIENT: ClientId = ClientId(3);

    fn setup(limit: usize) -> (ChannelRegistry, Arc<ProcessEntry>) {
        let process = Arc::new(ProcessEntry::new(CLIENT));
        (ChannelRegistry::new(limit), process)
    }

    fn callback(method: u32) -> Message {
        Message::InterfaceCallback {
            context: 0,
            method,
            payload: Vec::new(),
        }
    }

    fn method_of(outcome: ReadOutcome) -> u32 {
        match outcome {
            ReadOutcome::Message(Message::InterfaceCallback { method, .. }) => method,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_priority_then_fifo() {
        let (registry, process) = setup(16);
        let ch = registry.open(&process, ChannelFlags::empty());
        ch.enqueue(callback(1), Priority::Normal, None);
        ch.enqueue(callback(2), Priority::Urgent, None);
        ch.enqueue(callback(3), Priority::Normal, None);
        ch.enqueue(callback(4), Priority::Background, None);

        let order: Vec<u32> = (0..4)
            .map(|_| method_of(ch.read_message(false).unwrap()))
            .collect();
        assert_eq!(order, vec![2, 1, 3, 4]);
        assert_eq!(ch.read_message(false), Ok(ReadOutcome::WouldBlock));
    }

    #[test]
    fn test_queue_limit_drops() {
        let (registry, process) = setup(2);
        let ch = registry.open(&process, ChannelFlags::empty());
        assert!(ch.enqueue(callback(1), Priority::Normal, None));
        assert!(ch.enqueue(callback(2), Priority::Normal, None));
        assert!(!ch.enqueue(callback(3), Priority::Normal, None));
        assert_eq!(ch.pending(), 2);
    }

    #[test]
    fn test_flush_reported_once() {
        let (registry, process) = setup(16);
        let ch = registry.open(&process, ChannelFlags::empty());
        ch.enqueue(callback(1), Priority::Normal, None);
        ch.flush();
        assert_eq!(ch.read_message(true), Ok(ReadOutcome::Flushed));
        assert_eq!(method_of(ch.read_message(true).unwrap()), 1);
        assert_eq!(ch.read_message(false), Ok(ReadOutcome::WouldBlock));
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let (registry, process) = setup(16);
        let ch = registry.open(&process, ChannelFlags::empty());
        let reader = {
            let ch = ch.clone();
            thread::spawn(move || ch.read_message(true))
        };
        thread::sleep(Duration::from_millis(20));
        registry.close(&ch).unwrap();
        assert_eq!(reader.join().unwrap(), Ok(ReadOutcome::Closed));
        assert_eq!(registry.channel_count(), 0);
        assert_eq!(registry.close(&ch), Err(CmError::UnknownHandle));
    }

    #[test]
    fn test_interrupt_blocked_reader() {
        let (registry, process) = setup(16);
        let ch = registry.open(&process, ChannelFlags::empty());
        let reader = {
            let ch = ch.clone();
            thread::spawn(move || ch.read_message(true))
        };
        thread::sleep(Duration::from_millis(20));
        ch.interrupt_readers();
        assert_eq!(reader.join().unwrap(), Err(CmError::Interrupted));
    }

    #[test]
    fn test_closed_channel_kept_until_last_unbind() {
        let (registry, process) = setup(16);
        let ch = registry.open(&process, ChannelFlags::empty());
        let binding = registry
            .bind(CLIENT, ch.id(), ComponentHandle(9), Priority::Normal, 0xabc)
            .unwrap();

        registry.close(&ch).unwrap();
        assert_eq!(ch.state(), ChannelState::Closed);
        assert_eq!(registry.channel_count(), 1);
        assert!(!registry.dispatch_callback(binding.handle, 0, vec![1]));

        let info = registry.unbind(CLIENT, binding.handle).unwrap();
        assert_eq!(info.context, 0xabc);
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_unbind_purges_queued_callbacks() {
        let (registry, process) = setup(16);
        let ch = registry.open(&process, ChannelFlags::empty());
        let a = registry
            .bind(CLIENT, ch.id(), ComponentHandle(1), Priority::Normal, 1)
            .unwrap();
        let b = registry
            .bind(CLIENT, ch.id(), ComponentHandle(2), Priority::Normal, 2)
            .unwrap();
        registry.dispatch_callback(a.handle, 10, Vec::new());
        registry.dispatch_callback(b.handle, 20, Vec::new());
        registry.dispatch_callback(a.handle, 11, Vec::new());

        registry.unbind(CLIENT, a.handle).unwrap();
        assert_eq!(method_of(ch.read_message(false).unwrap()), 20);
        assert_eq!(ch.read_message(false), Ok(ReadOutcome::WouldBlock));
    }

    #[test]
    fn test_bind_rejects_foreign_channel() {
        let (registry, process) = setup(16);
        let ch = registry.open(&process, ChannelFlags::empty());
        assert_eq!(
            registry.bind(ClientId(99), ch.id(), ComponentHandle(1), Priority::Normal, 0),
            Err(CmError::UnknownHandle)
        );
    }

    #[test]
    fn test_panic_dump_goes_to_earliest_channel() {
        let (registry, process) = setup(16);
        let first = registry.open(&process, ChannelFlags::empty());
        let second = registry.open(&process, ChannelFlags::empty());
        let event = ServiceEvent::Panic {
            core: CoreId(1),
            reason: 2,
            info: 3,
            capture_dump: false,
        };
        assert_eq!(registry.dispatch_to_all(&event), 2);

        let flag = |ch: &ChannelHandle| match ch.read_message(false).unwrap() {
            ReadOutcome::Message(Message::Service(ServiceEvent::Panic {
                capture_dump, ..
            })) => capture_dump,
            other => panic!("unexpected {other:?}"),
        };
        assert!(flag(&first));
        assert!(!flag(&second));
    }

    #[test]
    fn test_byte_read_keeps_message_on_small_buffer() {
        let (registry, process) = setup(16);
        let ch = registry.open(&process, ChannelFlags::empty());
        let message = Message::InterfaceCallback {
            context: 5,
            method: 6,
            payload: vec![1, 2, 3],
        };
        let need = message.encoded_len();
        ch.enqueue(message.clone(), Priority::Normal, None);

        let mut small = vec![0u8; need - 1];
        assert_eq!(ch.read(&mut small, false), Err(CmError::BufferTooSmall(need)));
        let mut buf = vec![0u8; 64];
        assert_eq!(ch.read(&mut buf, false), Ok(need));
        assert_eq!(Message::decode(&buf[..need]), Ok((message, need)));
        assert_eq!(ch.read(&mut buf, false), Err(CmError::WouldBlock));
    }

    #[test]
    fn test_release_client_removes_everything() {
        let (registry, process) = setup(16);
        let ch = registry.open(&process, ChannelFlags::empty());
        registry
            .bind(CLIENT, ch.id(), ComponentHandle(1), Priority::Normal, 0)
            .unwrap();
        registry.open(&process, ChannelFlags::empty());

        assert_eq!(registry.release_client(CLIENT), 2);
        assert_eq!(registry.channel_count(), 0);
        assert_eq!(registry.binding_count(), 0);
        assert_eq!(ch.read_message(true), Ok(ReadOutcome::Closed));
    }
}
