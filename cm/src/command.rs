//! 控制命令
//!
//! 校验客户端传入的定长结构体（名字长度与编码、枚举取值、核编号、句柄归属），
//! 再转发给引擎或运行时内部的登记表。每条命令要么完整生效，要么不改变任何状态。

use log::{debug, warn};
use uapi::cmd::{
    AllocMemoryIn, AllocMemoryOut, BindToHostIn, BindToHostOut, ConfigureRelinkIn,
    DescribeMemoryOut, DomainIn, InstantiateOut, MemoryStatusOut, Name, Reply, Request, SetModeIn,
    UnbindToHostOut, VersionOut, decode_name, mode,
};
use uapi::{
    CM_ABI_VERSION, DomainDesc, MemoryKind, PerfLevel, Priority, RelinkDirection, SkeletonHandle,
};

use crate::context::CmContext;
use crate::error::{CmError, CmResult};
use crate::platform::{PowerResource, TaskId};
use crate::process::ProcessHandle;

/// 命令的调用者
pub struct Caller<'a> {
    /// 调用者所属进程
    pub process: &'a ProcessHandle,
    /// 调用者任务
    pub task: TaskId,
}

/// 命令完成状态
///
/// `status` 为 0 或负的错误码；引擎错误时 `engine_status` 携带引擎原始错误码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// 状态码
    pub status: i32,
    /// 引擎错误码
    pub engine_status: i32,
    /// 输出结构体，失败时为 `None`
    pub reply: Option<Reply>,
}

fn name(raw: &Name) -> CmResult<&str> {
    decode_name(raw).ok_or(CmError::InvalidParameter)
}

fn priority(raw: u32) -> CmResult<Priority> {
    Priority::from_raw(raw).ok_or(CmError::InvalidParameter)
}

fn to_usize(value: u64) -> CmResult<usize> {
    usize::try_from(value).map_err(|_| CmError::InvalidParameter)
}

impl CmContext {
    /// 执行一条命令
    pub fn execute(&self, caller: &Caller<'_>, request: Request) -> CmResult<Reply> {
        let process = caller.process;
        let client = process.client();
        let engine = self.engine();

        match request {
            Request::GetVersion => Ok(Reply::Version(VersionOut {
                abi: CM_ABI_VERSION,
                engine: engine.version(),
            })),

            Request::Instantiate(input) => {
                let template = name(&input.template)?;
                let local_name = name(&input.local_name)?;
                let priority = priority(input.priority)?;
                if !process.owns_domain(input.domain) {
                    return Err(CmError::UnknownHandle);
                }
                let component =
                    engine.instantiate(client, input.domain, template, local_name, priority)?;
                Ok(Reply::Instantiate(InstantiateOut { component }))
            }
            Request::Bind(input) => {
                let required = name(&input.required_itf)?;
                let provided = name(&input.provided_itf)?;
                engine.bind(client, input.client, required, input.server, provided)?;
                Ok(Reply::None)
            }
            Request::Unbind(input) => {
                let required = name(&input.required_itf)?;
                engine.unbind(client, input.client, required)?;
                Ok(Reply::None)
            }
            Request::Destroy(input) => {
                engine.destroy(client, input.component)?;
                Ok(Reply::None)
            }
            Request::BindToHost(input) => self.bind_to_host(caller, &input),
            Request::UnbindToHost(input) => self.unbind_to_host(caller, input.skeleton),

            Request::AllocMemory(input) => self.alloc_memory(caller, &input),
            Request::FreeMemory(input) => {
                self.free_memory(process, input.handle)?;
                Ok(Reply::None)
            }
            Request::ReserveMemory(input) => {
                self.reserve_for_mapping(process, to_usize(input.physical)?, caller.task)?;
                Ok(Reply::None)
            }
            Request::CancelReservation(input) => {
                self.cancel_reservation(process, to_usize(input.physical)?, caller.task)?;
                Ok(Reply::None)
            }
            Request::DescribeMemory(input) => {
                let info = self.describe_memory(process, input.handle)?;
                Ok(Reply::DescribeMemory(DescribeMemoryOut {
                    physical: info.physical as u64,
                    kernel_logical: info.kernel_logical as u64,
                    user_logical: info.user_logical.unwrap_or(0) as u64,
                    size: info.size as u32,
                    kind: info.kind as u32,
                    core: info.core,
                    map_count: info.map_count,
                }))
            }
            Request::GetMemoryStatus => {
                let stats = process.memory_stats();
                Ok(Reply::MemoryStatus(MemoryStatusOut {
                    areas: stats.areas as u32,
                    allocated_bytes: stats.allocated_bytes as u64,
                    mapped_bytes: stats.mapped_bytes as u64,
                }))
            }

            Request::CreateDomain(input) => self.create_domain(caller, &input.desc),
            Request::DestroyDomain(input) => {
                let domain = input.domain;
                if !process.owns_domain(domain) {
                    return Err(CmError::UnknownHandle);
                }
                engine.destroy_domain(client, domain)?;
                if process.remove_domain(domain) == Some(true) {
                    self.power().release(PowerResource::Esram);
                }
                Ok(Reply::None)
            }
            Request::GetDomainState(input) => {
                if !process.owns_domain(input.domain) {
                    return Err(CmError::UnknownHandle);
                }
                Ok(Reply::DomainState(
                    engine.domain_state(client, input.domain)?,
                ))
            }

            Request::SetMode(input) => self.set_mode(&input),

            Request::ConfigureRelink(input) => self.configure_relink_cmd(&input),
            Request::StopRelink => {
                self.stop_relink()?;
                Ok(Reply::None)
            }

            Request::FlushChannel(input) => {
                let channel = self
                    .channels()
                    .lookup(input.channel)
                    .filter(|c| c.client() == client)
                    .ok_or(CmError::UnknownHandle)?;
                channel.flush();
                Ok(Reply::None)
            }
        }
    }

    /// 执行一条命令并转换为状态码形式
    pub fn ioctl(&self, caller: &Caller<'_>, request: Request) -> Completion {
        let cmd = request.cmd_no();
        match self.execute(caller, request) {
            Ok(reply) => Completion {
                status: 0,
                engine_status: 0,
                reply: Some(reply),
            },
            Err(err) => {
                debug!(
                    "cm: {}: {:?} failed: {}",
                    caller.process.client(),
                    cmd,
                    err
                );
                Completion {
                    status: err.to_errno(),
                    engine_status: err.engine_code(),
                    reply: None,
                }
            }
        }
    }

    /// 先登记绑定再通知引擎，引擎失败时撤销登记
    fn bind_to_host(&self, caller: &Caller<'_>, input: &BindToHostIn) -> CmResult<Reply> {
        let client = caller.process.client();
        let required = name(&input.required_itf)?;
        let priority = priority(input.priority)?;
        let binding = self.channels().bind(
            client,
            input.channel,
            input.component,
            priority,
            input.context,
        )?;
        if let Err(code) =
            self.engine()
                .bind_to_host(client, input.component, required, binding.handle)
        {
            if let Err(e) = self.channels().unbind(client, binding.handle) {
                warn!(
                    "cm: {}: rollback of skeleton {} failed: {}",
                    client, binding.handle.0, e
                );
            }
            return Err(code.into());
        }
        Ok(Reply::BindToHost(BindToHostOut {
            skeleton: binding.handle,
        }))
    }

    /// 先让引擎停止回调，再解除绑定并清除已排队的消息
    fn unbind_to_host(&self, caller: &Caller<'_>, skeleton: SkeletonHandle) -> CmResult<Reply> {
        let client = caller.process.client();
        match self.channels().binding(skeleton) {
            Some(binding) if binding.client == client => {}
            _ => return Err(CmError::UnknownHandle),
        }
        self.engine().unbind_from_host(client, skeleton)?;
        let binding = self.channels().unbind(client, skeleton)?;
        Ok(Reply::UnbindToHost(UnbindToHostOut {
            context: binding.context,
        }))
    }

    fn alloc_memory(&self, caller: &Caller<'_>, input: &AllocMemoryIn) -> CmResult<Reply> {
        let kind = MemoryKind::from_raw(input.kind).ok_or(CmError::InvalidParameter)?;
        let process = caller.process;
        let handle = self.allocate(
            process,
            input.core,
            kind,
            input.size as usize,
            input.alignment as usize,
        )?;
        let info = self.describe_memory(process, handle)?;
        Ok(Reply::AllocMemory(AllocMemoryOut {
            handle,
            physical: info.physical as u64,
            kernel_logical: info.kernel_logical as u64,
        }))
    }

    /// 使用 ESRAM 的内存域在存续期间持有 ESRAM 电源引用
    fn create_domain(&self, caller: &Caller<'_>, desc: &DomainDesc) -> CmResult<Reply> {
        self.check_core(desc.core)?;
        let esram = desc.uses_esram();
        if esram {
            self.power().acquire(PowerResource::Esram)?;
        }
        let process = caller.process;
        match self.engine().create_domain(process.client(), desc) {
            Ok(domain) => {
                process.add_domain(domain, esram);
                Ok(Reply::Domain(DomainIn { domain }))
            }
            Err(code) => {
                if esram {
                    self.power().release(PowerResource::Esram);
                }
                Err(code.into())
            }
        }
    }

    fn set_mode(&self, input: &SetModeIn) -> CmResult<Reply> {
        match input.mode {
            mode::FORCE_PERF_LEVEL => {
                self.check_core(input.core)?;
                let level = u32::try_from(input.param)
                    .ok()
                    .and_then(PerfLevel::from_raw)
                    .ok_or(CmError::InvalidParameter)?;
                self.governor().force_level(input.core, level)?;
            }
            mode::RELEASE_PERF_LEVEL => {
                self.check_core(input.core)?;
                self.governor().release_forced(input.core)?;
            }
            other => self.engine().set_mode(other, input.param)?,
        }
        Ok(Reply::None)
    }

    fn configure_relink_cmd(&self, input: &ConfigureRelinkIn) -> CmResult<Reply> {
        let direction =
            RelinkDirection::from_raw(input.direction).ok_or(CmError::InvalidParameter)?;
        self.configure_relink(
            direction,
            input.memory_base,
            input.peripheral_address,
            input.segment_count as usize,
            input.segment_size as usize,
            input.start_slot as usize,
        )?;
        Ok(Reply::None)
    }
}
