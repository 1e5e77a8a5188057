//! 消息的二进制布局
//!
//! 读取接口每次读出一条完整消息，布局如下（多字节字段均为小端）：
//!
//! ```text
//! 回调消息:  tag=0 (u8) | context (u64) | method (u32) | len (u32) | payload[len]
//! 服务事件:  tag=1 (u8) | kind (u8) | core (u8) | 事件负载
//!   Panic:    reason (u32) | info (u32) | capture_dump (u8)
//!   Print:    len (u32) | text[len]
//!   Trace:    len (u32) | data[len]
//!   Shutdown: (无)
//! ```
//!
//! 调用者提供的缓冲区小于下一条消息时，读取失败且消息不被消费。

use alloc::{string::String, vec::Vec};

use crate::types::CoreId;

/// 回调消息标签
pub const TAG_CALLBACK: u8 = 0;
/// 服务事件标签
pub const TAG_SERVICE: u8 = 1;

const CALLBACK_HEADER: usize = 1 + 8 + 4 + 4;
const SERVICE_HEADER: usize = 1 + 1 + 1;

/// 服务事件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceKind {
    /// DSP 核崩溃
    Panic = 0,
    /// DSP 打印输出
    Print = 1,
    /// DSP 跟踪数据
    Trace = 2,
    /// DSP 核下电
    Shutdown = 3,
}

impl ServiceKind {
    /// 从原始编号解析
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ServiceKind::Panic),
            1 => Some(ServiceKind::Print),
            2 => Some(ServiceKind::Trace),
            3 => Some(ServiceKind::Shutdown),
            _ => None,
        }
    }
}

/// 广播给所有通道的服务事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// DSP 核崩溃
    Panic {
        /// 发生错误的核
        core: CoreId,
        /// 固件报告的错误原因码
        reason: u32,
        /// 与原因码配套的附加信息
        info: u32,
        /// 收到该副本的通道负责抓取诊断转储
        capture_dump: bool,
    },
    /// DSP 打印输出
    Print {
        /// 来源核
        core: CoreId,
        /// 打印文本
        text: String,
    },
    /// DSP 跟踪数据
    Trace {
        /// 来源核
        core: CoreId,
        /// 原始跟踪字节
        data: Vec<u8>,
    },
    /// DSP 核已下电
    Shutdown {
        /// 下电的核
        core: CoreId,
    },
}

impl ServiceEvent {
    /// 事件种类
    pub fn kind(&self) -> ServiceKind {
        match self {
            ServiceEvent::Panic { .. } => ServiceKind::Panic,
            ServiceEvent::Print { .. } => ServiceKind::Print,
            ServiceEvent::Trace { .. } => ServiceKind::Trace,
            ServiceEvent::Shutdown { .. } => ServiceKind::Shutdown,
        }
    }

    /// 事件来源的核
    pub fn core(&self) -> CoreId {
        match self {
            ServiceEvent::Panic { core, .. }
            | ServiceEvent::Print { core, .. }
            | ServiceEvent::Trace { core, .. }
            | ServiceEvent::Shutdown { core } => *core,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            ServiceEvent::Panic { .. } => 4 + 4 + 1,
            ServiceEvent::Print { text, .. } => 4 + text.len(),
            ServiceEvent::Trace { data, .. } => 4 + data.len(),
            ServiceEvent::Shutdown { .. } => 0,
        }
    }
}

/// 通道中的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// DSP 组件对主机接口的调用
    InterfaceCallback {
        /// 绑定时登记的用户上下文
        context: u64,
        /// 接口方法下标
        method: u32,
        /// 不透明参数
        payload: Vec<u8>,
    },
    /// 服务事件
    Service(ServiceEvent),
}

/// 编码错误：缓冲区不足，附带所需字节数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTooSmall(pub usize);

/// 解码错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// 数据不完整
    Truncated,
    /// 未知的标签或事件种类
    UnknownTag(u8),
    /// 打印文本不是 UTF-8
    InvalidText,
}

impl Message {
    /// 编码后的字节数
    pub fn encoded_len(&self) -> usize {
        match self {
            Message::InterfaceCallback { payload, .. } => CALLBACK_HEADER + payload.len(),
            Message::Service(ev) => SERVICE_HEADER + ev.payload_len(),
        }
    }

    /// 编码到 `buf`，返回写入的字节数
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, BufferTooSmall> {
        let need = self.encoded_len();
        if buf.len() < need {
            return Err(BufferTooSmall(need));
        }
        let mut w = Writer { buf, pos: 0 };
        match self {
            Message::InterfaceCallback {
                context,
                method,
                payload,
            } => {
                w.put_u8(TAG_CALLBACK);
                w.put(&context.to_le_bytes());
                w.put(&method.to_le_bytes());
                w.put(&(payload.len() as u32).to_le_bytes());
                w.put(payload);
            }
            Message::Service(ev) => {
                w.put_u8(TAG_SERVICE);
                w.put_u8(ev.kind() as u8);
                w.put_u8(ev.core().0);
                match ev {
                    ServiceEvent::Panic {
                        reason,
                        info,
                        capture_dump,
                        ..
                    } => {
                        w.put(&reason.to_le_bytes());
                        w.put(&info.to_le_bytes());
                        w.put_u8(*capture_dump as u8);
                    }
                    ServiceEvent::Print { text, .. } => {
                        w.put(&(text.len() as u32).to_le_bytes());
                        w.put(text.as_bytes());
                    }
                    ServiceEvent::Trace { data, .. } => {
                        w.put(&(data.len() as u32).to_le_bytes());
                        w.put(data);
                    }
                    ServiceEvent::Shutdown { .. } => {}
                }
            }
        }
        Ok(w.pos)
    }

    /// 从 `buf` 解码一条消息，返回消息和消耗的字节数
    pub fn decode(buf: &[u8]) -> Result<(Message, usize), DecodeError> {
        let mut r = Reader { buf, pos: 0 };
        let msg = match r.u8()? {
            TAG_CALLBACK => {
                let context = r.u64()?;
                let method = r.u32()?;
                let len = r.u32()? as usize;
                let payload = r.bytes(len)?.to_vec();
                Message::InterfaceCallback {
                    context,
                    method,
                    payload,
                }
            }
            TAG_SERVICE => {
                let raw_kind = r.u8()?;
                let kind = ServiceKind::from_raw(raw_kind).ok_or(DecodeError::UnknownTag(raw_kind))?;
                let core = CoreId(r.u8()?);
                let ev = match kind {
                    ServiceKind::Panic => ServiceEvent::Panic {
                        core,
                        reason: r.u32()?,
                        info: r.u32()?,
                        capture_dump: r.u8()? != 0,
                    },
                    ServiceKind::Print => {
                        let len = r.u32()? as usize;
                        let text = core::str::from_utf8(r.bytes(len)?)
                            .map_err(|_| DecodeError::InvalidText)?;
                        ServiceEvent::Print {
                            core,
                            text: String::from(text),
                        }
                    }
                    ServiceKind::Trace => {
                        let len = r.u32()? as usize;
                        ServiceEvent::Trace {
                            core,
                            data: r.bytes(len)?.to_vec(),
                        }
                    }
                    ServiceKind::Shutdown => ServiceEvent::Shutdown { core },
                };
                Message::Service(ev)
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };
        Ok((msg, r.pos))
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn put_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        let out = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.bytes(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(raw))
    }
}
