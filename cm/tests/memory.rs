//! 内存区登记的集成测试

mod common;

use std::sync::Barrier;
use std::thread;

use cm::uapi::{CoreId, MemHandle, MemoryKind};
use cm::{CmError, ClientId, MappingState, PowerResource, TaskId};
use common::MockContext;
use log::Level;
use proptest::prelude::*;
use test_support::MockPlatform;
use test_support::logger;
use test_support::mock::EngineOp;

const T1: TaskId = TaskId(101);
const T2: TaskId = TaskId(202);

#[test]
fn test_code_area_reserve_map_free_scenario() {
    let mocks = MockPlatform::new();
    let cm = mocks.context().unwrap();
    let p1 = cm.acquire_process(ClientId(1));

    let handle = cm
        .allocate(&p1, CoreId(0), MemoryKind::Code, 4096, 4096)
        .unwrap();
    let info = cm.describe_memory(&p1, handle).unwrap();
    assert_eq!(info.physical, 0x1000);

    cm.reserve_for_mapping(&p1, 0x1000, T1).unwrap();
    assert_eq!(
        cm.reserve_for_mapping(&p1, 0x1000, T2),
        Err(CmError::AlreadyReserved)
    );
    let user = cm.map(&p1, 0x1000, T1).unwrap();
    assert_eq!(mocks.mapper.physical_of(user), Some(0x1000));
    assert_eq!(cm.describe_memory(&p1, handle).unwrap().map_count, 1);

    assert_eq!(cm.free_memory(&p1, handle), Err(CmError::ResourceBusy));
    assert_eq!(p1.areas().len(), 1);

    assert_eq!(cm.unmap(&p1, 0x1000), Ok(0));
    cm.free_memory(&p1, handle).unwrap();
    assert!(p1.areas().is_empty());
    assert_eq!(mocks.engine.live_areas(), 0);
    cm.release_process(p1);
}

#[test]
fn test_concurrent_reservations_have_one_winner() {
    const TASKS: u32 = 8;
    let mocks = MockPlatform::new();
    let cm = mocks.context().unwrap();
    let p = cm.acquire_process(ClientId(9));

    for _ in 0..50 {
        let handle = cm
            .allocate(&p, CoreId(0), MemoryKind::Data, 4096, 4096)
            .unwrap();
        let physical = cm.describe_memory(&p, handle).unwrap().physical;

        let barrier = Barrier::new(TASKS as usize);
        let results: Vec<_> = thread::scope(|s| {
            let workers: Vec<_> = (1..=TASKS)
                .map(|task| {
                    let (cm, p, barrier) = (&cm, &p, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        (task, cm.reserve_for_mapping(p, physical, TaskId(task.into())))
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let winners: Vec<_> = results
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|&(task, _)| TaskId(task.into()))
            .collect();
        assert_eq!(winners.len(), 1);
        assert!(
            results
                .iter()
                .filter(|(_, result)| result.is_err())
                .all(|(_, result)| *result == Err(CmError::AlreadyReserved))
        );
        assert_eq!(
            cm.describe_memory(&p, handle).unwrap().state,
            MappingState::Reserved(winners[0])
        );
        cm.free_memory(&p, handle).unwrap();
    }
    cm.release_process(p);
}

#[test]
fn test_page_offset_mapping() {
    let mocks = MockPlatform::new();
    let cm = mocks.context().unwrap();
    let p = cm.acquire_process(ClientId(2));
    let handle = cm
        .allocate(&p, CoreId(1), MemoryKind::Data, 8192, 0)
        .unwrap();
    let physical = cm.describe_memory(&p, handle).unwrap().physical;
    let page = physical / cm.config().page_size;

    assert_eq!(
        cm.map_offset(&p, page, 8192, T1),
        Err(CmError::NotReserved)
    );
    cm.reserve_for_mapping(&p, physical, T1).unwrap();
    let user = cm.map_offset(&p, page, 8192, T1).unwrap();
    let info = cm.describe_memory(&p, handle).unwrap();
    assert_eq!(info.user_logical, Some(user));
    assert_eq!(info.state, MappingState::Mapped);
    cm.release_process(p);
    assert_eq!(mocks.mapper.live(), 0);
}

#[test]
fn test_address_failure_leaves_no_engine_area() {
    let mocks = MockPlatform::new();
    let cm = mocks.context().unwrap();
    let p = cm.acquire_process(ClientId(3));

    mocks.engine.fail_next(EngineOp::MemoryAddresses);
    assert!(matches!(
        cm.allocate(&p, CoreId(0), MemoryKind::EsramCode, 1024, 4),
        Err(CmError::Engine(_))
    ));
    assert_eq!(mocks.engine.live_areas(), 0);
    assert!(p.areas().is_empty());
    assert!(!mocks.power.is_on(PowerResource::Esram));
    cm.release_process(p);
}

#[test]
fn test_engine_free_failure_keeps_descriptor() {
    let mocks = MockPlatform::new();
    let cm = mocks.context().unwrap();
    let p = cm.acquire_process(ClientId(4));
    let handle = cm
        .allocate(&p, CoreId(0), MemoryKind::Data, 64, 4)
        .unwrap();

    mocks.engine.fail_next(EngineOp::FreeMemory);
    assert!(matches!(cm.free_memory(&p, handle), Err(CmError::Engine(_))));
    assert_eq!(p.areas().len(), 1);
    cm.free_memory(&p, handle).unwrap();
    assert_eq!(
        cm.free_memory(&p, handle),
        Err(CmError::UnknownHandle)
    );
    cm.release_process(p);
}

#[test]
fn test_teardown_warns_about_mapped_area() {
    logger::init();
    let mocks = MockPlatform::new();
    let cm = mocks.context().unwrap();
    let p = cm.acquire_process(ClientId(4321));
    let handle = cm
        .allocate(&p, CoreId(0), MemoryKind::Code, 4096, 4096)
        .unwrap();
    let physical = cm.describe_memory(&p, handle).unwrap().physical;
    cm.reserve_for_mapping(&p, physical, T1).unwrap();
    cm.map(&p, physical, T1).unwrap();

    cm.release_process(p);
    assert!(logger::contains(Level::Warn, "client 4321: MemHandle"));
    assert_eq!(mocks.mapper.live(), 0);
    assert_eq!(mocks.engine.live_areas(), 0);
}

#[test]
fn test_esram_power_failure_allocates_nothing() {
    let mocks = MockPlatform::new();
    let cm = mocks.context().unwrap();
    let p = cm.acquire_process(ClientId(5));

    mocks.power.fail_next_enable();
    assert!(matches!(
        cm.allocate(&p, CoreId(0), MemoryKind::EsramData, 256, 4),
        Err(CmError::Engine(_))
    ));
    assert!(mocks.engine.area_handles().is_empty());
    assert_eq!(cm.power().refcount(PowerResource::Esram), 0);

    let first = cm
        .allocate(&p, CoreId(0), MemoryKind::EsramData, 256, 4)
        .unwrap();
    let second = cm
        .allocate(&p, CoreId(1), MemoryKind::EsramCode, 256, 4)
        .unwrap();
    assert_eq!(cm.power().refcount(PowerResource::Esram), 2);
    assert_eq!(
        mocks.engine.area_handles().into_iter().collect::<Vec<_>>(),
        vec![first, second]
    );

    cm.free_memory(&p, first).unwrap();
    assert!(mocks.power.is_on(PowerResource::Esram));
    cm.free_memory(&p, second).unwrap();
    assert!(!mocks.power.is_on(PowerResource::Esram));
    cm.release_process(p);
}

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Free(usize),
    Pin(usize),
    Unpin(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1usize..16384).prop_map(Op::Alloc),
        any::<usize>().prop_map(Op::Free),
        any::<usize>().prop_map(Op::Pin),
        any::<usize>().prop_map(Op::Unpin),
    ]
}

proptest! {
    #[test]
    fn prop_live_descriptors_follow_successful_frees(ops in prop::collection::vec(op(), 1..40)) {
        let mocks = MockPlatform::new();
        let cm = mocks.context().unwrap();
        let p = cm.acquire_process(ClientId(77));
        // (句柄, 物理地址, 是否已映射)
        let mut model: Vec<(MemHandle, usize, bool)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(size) => {
                    let handle = cm.allocate(&p, CoreId(0), MemoryKind::Data, size, 4).unwrap();
                    let physical = cm.describe_memory(&p, handle).unwrap().physical;
                    model.push((handle, physical, false));
                }
                Op::Free(i) if !model.is_empty() => {
                    let index = i % model.len();
                    let (handle, _, mapped) = model[index];
                    let result = cm.free_memory(&p, handle);
                    if mapped {
                        prop_assert_eq!(result, Err(CmError::ResourceBusy));
                    } else {
                        prop_assert_eq!(result, Ok(()));
                        model.remove(index);
                    }
                }
                Op::Pin(i) if !model.is_empty() => {
                    let index = i % model.len();
                    let (_, physical, _) = model[index];
                    if cm.reserve_for_mapping(&p, physical, T1).is_ok() {
                        cm.map(&p, physical, T1).unwrap();
                        model[index].2 = true;
                    }
                }
                Op::Unpin(i) if !model.is_empty() => {
                    let index = i % model.len();
                    let (_, physical, mapped) = model[index];
                    if mapped {
                        cm.unmap(&p, physical).unwrap();
                        model[index].2 = false;
                    }
                }
                _ => {}
            }
            prop_assert_eq!(p.areas().len(), model.len());
            prop_assert_eq!(mocks.engine.live_areas(), model.len());
        }
        cm.release_process(p);
        prop_assert_eq!(mocks.engine.live_areas(), 0);
    }

    #[test]
    fn prop_second_reservation_fails(first in 1u64..1000, second in 1u64..1000) {
        let mocks = MockPlatform::new();
        let cm = mocks.context().unwrap();
        let p = cm.acquire_process(ClientId(78));
        let handle = cm.allocate(&p, CoreId(0), MemoryKind::Code, 4096, 4096).unwrap();
        let physical = cm.describe_memory(&p, handle).unwrap().physical;

        cm.reserve_for_mapping(&p, physical, TaskId(first)).unwrap();
        prop_assert_eq!(
            cm.reserve_for_mapping(&p, physical, TaskId(second)),
            Err(CmError::AlreadyReserved)
        );
        cm.map(&p, physical, TaskId(first)).unwrap();
        prop_assert_eq!(
            cm.map(&p, physical, TaskId(first)),
            Err(CmError::AlreadyMapped)
        );
        cm.release_process(p);
    }
}
