//! 异步事件投递
//!
//! 引擎在中断上下文中通过 [`EventProducer::raise`] 上报事件：只做一次
//! 非阻塞的入队，队列满时丢弃并记录日志。[`DispatchWorker`] 在独立线程中
//! 取出事件并投递到通道登记表。

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, select};
use log::{debug, error, warn};
use uapi::SkeletonHandle;
use uapi::message::ServiceEvent;

use crate::channel::ChannelRegistry;

/// 引擎上报的原始事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// DSP 组件调用了绑定到主机的接口
    Callback {
        /// 回调句柄
        handle: SkeletonHandle,
        /// 方法下标
        method: u32,
        /// 参数
        payload: Vec<u8>,
    },
    /// 服务事件，广播给所有打开的通道
    Service(ServiceEvent),
}

/// 事件生产者，可在任意上下文中使用
#[derive(Clone)]
pub struct EventProducer {
    tx: Sender<RawEvent>,
}

impl EventProducer {
    /// 上报一个事件，从不阻塞
    ///
    /// 队列已满或消费者已停止时丢弃事件并返回 `false`。
    pub fn raise(&self, event: RawEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("cm: event queue full, dropping {:?}", Kind(&event));
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                warn!("cm: dispatcher stopped, dropping {:?}", Kind(&event));
                false
            }
        }
    }
}

/// 日志中只打印事件种类
struct Kind<'a>(&'a RawEvent);

impl core::fmt::Debug for Kind<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            RawEvent::Callback { handle, method, .. } => {
                write!(f, "callback {}#{}", handle.0, method)
            }
            RawEvent::Service(event) => write!(f, "{:?} from core {}", event.kind(), event.core().0),
        }
    }
}

/// 创建事件队列
pub fn event_queue(capacity: usize) -> (EventProducer, Receiver<RawEvent>) {
    let (tx, rx) = bounded(capacity);
    (EventProducer { tx }, rx)
}

/// 投递一个事件
pub fn deliver(channels: &ChannelRegistry, event: RawEvent) {
    match event {
        RawEvent::Callback {
            handle,
            method,
            payload,
        } => {
            channels.dispatch_callback(handle, method, payload);
        }
        RawEvent::Service(event) => {
            channels.dispatch_to_all(&event);
        }
    }
}

/// 事件消费线程
pub struct DispatchWorker {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl DispatchWorker {
    /// 启动消费线程
    pub fn spawn(events: Receiver<RawEvent>, channels: Arc<ChannelRegistry>) -> Self {
        let (stop, stopped) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("cm-dispatch".into())
            .spawn(move || run(events, stopped, channels));
        let thread = match thread {
            Ok(thread) => Some(thread),
            Err(e) => {
                error!("cm: failed to spawn dispatcher: {}", e);
                None
            }
        };
        Self { stop, thread }
    }

    /// 消费线程是否在运行
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// 停止消费线程并等待其退出
    ///
    /// 退出前投递队列中已有的事件。
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.stop.try_send(());
        if thread.join().is_err() {
            error!("cm: dispatcher thread panicked");
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(events: Receiver<RawEvent>, stopped: Receiver<()>, channels: Arc<ChannelRegistry>) {
    debug!("cm: dispatcher running");
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => deliver(&channels, event),
                Err(_) => break,
            },
            recv(stopped) -> _ => break,
        }
    }
    loop {
        match events.try_recv() {
            Ok(event) => deliver(&channels, event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
    debug!("cm: dispatcher stopped");
}
