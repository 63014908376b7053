use crate::runtime::abi::{MarshaledValue, Primitive, RawValue};
use crate::runtime::context::{BoundaryContext, Bridge};
use crate::runtime::error::BridgeError;
use crate::runtime::exception::{FailureState, ForeignFailure};
use crate::runtime::refs::{ForeignHandle, Lifetime, RawEnv, RawRef};
use crate::runtime::signature::MethodDescriptor;
use crate::runtime::sim::{SimOutcome, SimulatedHost};
use proptest::prelude::*;

fn attach(bridge: &Bridge) -> BoundaryContext<SimulatedHost> {
    bridge.attach(SimulatedHost::new(), RawEnv::null())
}

fn desc(name: &str, sig: &str) -> MethodDescriptor {
    MethodDescriptor::new("com/example/oboedemo/ZigLib", name, sig).expect("valid descriptor")
}

#[test]
fn test_local_invalid_after_exit() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    let h = ctx.acquire_local(RawRef::from_usize(0x1)).unwrap();
    assert!(ctx.is_valid(&h));
    assert_eq!(ctx.exit(), Ok(1));
    assert!(!ctx.is_valid(&h));

    // Reuse in a later entry is rejected.
    ctx.enter();
    assert_eq!(
        ctx.promote(h, Lifetime::Global),
        Err(BridgeError::InvalidHandle(h))
    );
    ctx.exit().unwrap();
}

#[test]
fn test_promoted_global_survives_exit() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    let local = ctx.acquire_local(RawRef::from_usize(0x40)).unwrap();
    let global = ctx.promote(local, Lifetime::Global).unwrap();
    let unpromoted = ctx.acquire_local(RawRef::from_usize(0x50)).unwrap();
    ctx.exit().unwrap();

    assert!(ctx.is_valid(&global));
    assert!(!ctx.is_valid(&local));
    assert!(!ctx.is_valid(&unpromoted));

    ctx.enter();
    ctx.release(global).unwrap();
    ctx.exit().unwrap();
    assert_eq!(bridge.registry().stats().outstanding(), 0);
}

#[test]
fn test_double_release_scenario() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    let h = ctx.acquire_local(RawRef::from_usize(0x1)).unwrap();
    let g = ctx.promote(h, Lifetime::Global).unwrap();
    assert_eq!(ctx.release(g), Ok(()));
    assert_eq!(ctx.release(g), Err(BridgeError::DoubleRelease(g)));
    ctx.exit().unwrap();
}

#[test]
fn test_weak_collected_reports_invalid() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    let raw = RawRef::from_usize(0x80);

    ctx.enter();
    let local = ctx.acquire_local(raw).unwrap();
    let weak = ctx.promote(local, Lifetime::Weak).unwrap();
    assert!(ctx.is_valid(&weak));

    bridge.registry().mark_collected(raw);
    assert!(!ctx.is_valid(&weak));

    // Re-validation yields the null handle instead of an error.
    assert_eq!(ctx.promote(weak, Lifetime::Local), Ok(ForeignHandle::NULL));
    assert_eq!(ctx.release(weak), Ok(()));
    ctx.exit().unwrap();
}

#[test]
fn test_weak_requires_revalidation_for_global() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    let local = ctx.acquire_local(RawRef::from_usize(0x90)).unwrap();
    let weak = ctx.promote(local, Lifetime::Weak).unwrap();
    assert_eq!(
        ctx.promote(weak, Lifetime::Global),
        Err(BridgeError::UnsupportedPromotion {
            from: Lifetime::Weak,
            to: Lifetime::Global
        })
    );

    let live = ctx.promote(weak, Lifetime::Local).unwrap();
    assert!(!live.is_null());
    let global = ctx.promote(live, Lifetime::Global).unwrap();
    assert!(ctx.is_valid(&global));

    ctx.release(global).unwrap();
    ctx.release(weak).unwrap();
    ctx.exit().unwrap();
}

#[test]
fn test_operations_fail_outside_entry() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    assert!(!ctx.in_entry());
    assert_eq!(
        ctx.acquire_local(RawRef::from_usize(0x1)),
        Err(BridgeError::NotInEntry)
    );
    assert_eq!(ctx.release(ForeignHandle::NULL), Err(BridgeError::NotInEntry));
    assert_eq!(ctx.push_local_frame(4), Err(BridgeError::NotInEntry));
    assert_eq!(ctx.exit(), Err(BridgeError::NotInEntry));
    assert!(!ctx.is_valid(&ForeignHandle::NULL));
}

#[test]
fn test_null_raw_is_null_handle() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    ctx.with_entry(|ctx| {
        let h = ctx.acquire_local(RawRef::null())?;
        assert!(h.is_null());
        assert_eq!(ctx.promote(h, Lifetime::Global)?, ForeignHandle::NULL);
        ctx.release(h)
    })
    .unwrap();
}

#[test]
fn test_pending_failure_blocks_until_acknowledged() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    let host = ctx.host_mut();
    host.throwing("add", "java/lang/ArithmeticException", "overflow", RawValue::ZERO);
    host.returning("ping", true.to_raw());

    ctx.enter();
    let err = ctx
        .call_static(&desc("add", "(II)I"), &[1i32.into(), 2i32.into()])
        .unwrap_err();
    assert!(err.is_foreign());
    assert!(matches!(ctx.pending(), Some(f) if f.message == "overflow"));

    let ping = desc("ping", "()Z");
    for _ in 0..3 {
        assert_eq!(
            ctx.call_static(&ping, &[]),
            Err(BridgeError::ReentrantPendingFailure)
        );
    }
    assert_eq!(ctx.host().calls_while_pending(), 0);

    let failure = ctx.acknowledge().expect("pending failure");
    assert_eq!(
        failure,
        ForeignFailure::new("java/lang/ArithmeticException", "overflow")
    );
    assert!(ctx.host().host_pending().is_none());
    assert_eq!(ctx.acknowledge(), None);

    assert_eq!(ctx.call_static(&ping, &[]), Ok(MarshaledValue::Boolean(true)));
    ctx.exit().unwrap();
}

#[test]
fn test_failure_flag_overrides_non_null_result() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    let host = ctx.host_mut();
    let obj = host.alloc_object();
    host.on("create", move |_, _| SimOutcome::Throw {
        failure: ForeignFailure::new("java/lang/OutOfMemoryError", "heap"),
        raw: RawValue::from_address(obj.as_usize()),
    });

    ctx.enter();
    let result = ctx.call_static(&desc("create", "()Ljava/lang/Object;"), &[]);
    assert_eq!(
        result,
        Err(BridgeError::ForeignFailure {
            kind: "java/lang/OutOfMemoryError".into(),
            message: "heap".into()
        })
    );
    assert!(matches!(ctx.exceptions.state(), FailureState::Pending(_)));
    // No Local was created for the untrusted result.
    assert_eq!(ctx.exit(), Ok(0));
}

#[test]
fn test_unacknowledged_failure_propagates_on_exit() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    ctx.host_mut()
        .throwing("fail", "java/lang/IllegalStateException", "nope", RawValue::ZERO);

    ctx.enter();
    assert!(ctx.call_static(&desc("fail", "()V"), &[]).is_err());
    ctx.exit().unwrap();

    // Host still holds it for the foreign caller; the context starts clean.
    assert!(ctx.host().host_pending().is_some());
    assert!(ctx.pending().is_none());
}

#[test]
fn test_callback_raise_delivered_on_exit() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    let value: i32 = ctx.complete_callback(Err(BridgeError::NoLocalFrame));
    assert_eq!(value, 0);
    assert!(ctx.host().thrown().is_empty(), "delivered only when returning");
    ctx.exit().unwrap();

    let thrown = ctx.host().thrown();
    assert_eq!(thrown.len(), 1);
    assert_eq!(thrown[0].kind, "java/lang/RuntimeException");
    assert_eq!(thrown[0].message, "no local frame to pop");
}

#[test]
fn test_callback_rethrows_foreign_failure_kind() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    ctx.host_mut()
        .throwing("inner", "java/io/IOException", "disk", RawValue::ZERO);

    ctx.enter();
    let result = ctx.call_static(&desc("inner", "()J"), &[]).and_then(|v| v.as_long());
    let failure = ctx.acknowledge();
    assert!(failure.is_some());
    let value = ctx.complete_callback(result);
    assert_eq!(value, 0i64);
    ctx.exit().unwrap();

    assert_eq!(
        ctx.host().thrown(),
        &[ForeignFailure::new("java/io/IOException", "disk")]
    );
    assert_eq!(
        ctx.host().host_pending(),
        Some(&ForeignFailure::new("java/io/IOException", "disk"))
    );
}

#[test]
fn test_callback_success_returns_value() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    ctx.host_mut().on("add", |_, args| {
        SimOutcome::Return((i32::from_raw(args[0]) + i32::from_raw(args[1])).to_raw())
    });

    ctx.enter();
    let result = ctx
        .call_static(&desc("add", "(II)I"), &[2i32.into(), 3i32.into()])
        .and_then(|v| v.as_int());
    assert_eq!(ctx.complete_callback(result), 5);
    ctx.exit().unwrap();
    assert!(ctx.host().thrown().is_empty());
}

#[test]
fn test_local_frames_within_entry() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    let outer = ctx.acquire_local(RawRef::from_usize(0x100)).unwrap();
    ctx.push_local_frame(8).unwrap();
    let scratch = ctx.acquire_local(RawRef::from_usize(0x200)).unwrap();
    let result = ctx.acquire_local(RawRef::from_usize(0x300)).unwrap();
    let kept = ctx.pop_local_frame(result).unwrap();

    assert!(ctx.is_valid(&outer));
    assert!(!ctx.is_valid(&scratch));
    assert!(!ctx.is_valid(&result));
    assert!(ctx.is_valid(&kept));
    assert_eq!(ctx.resolve(&kept), Ok(RawRef::from_usize(0x300)));

    // The entry frame itself cannot be popped as a local frame.
    assert_eq!(
        ctx.pop_local_frame(ForeignHandle::NULL),
        Err(BridgeError::NoLocalFrame)
    );
    assert_eq!(ctx.exit(), Ok(2));
}

#[test]
fn test_exit_closes_open_local_frames() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    ctx.acquire_local(RawRef::from_usize(0x1)).unwrap();
    ctx.push_local_frame(4).unwrap();
    let inner = ctx.acquire_local(RawRef::from_usize(0x2)).unwrap();
    assert_eq!(ctx.exit(), Ok(2));
    assert!(!ctx.is_valid(&inner));
}

#[test]
fn test_nested_entries() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    let outer = ctx.acquire_local(RawRef::from_usize(0x1)).unwrap();
    ctx.enter();
    let inner = ctx.acquire_local(RawRef::from_usize(0x2)).unwrap();
    assert!(ctx.is_valid(&outer));
    ctx.exit().unwrap();
    assert!(ctx.is_valid(&outer));
    assert!(!ctx.is_valid(&inner));
    ctx.exit().unwrap();
    assert!(!ctx.is_valid(&outer));
}

#[test]
fn test_outer_raise_survives_nested_entry() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    ctx.raise(BridgeError::NoLocalFrame).unwrap();

    // Foreign code called back into native code, which returns normally.
    ctx.enter();
    ctx.exit().unwrap();
    assert!(ctx.host().thrown().is_empty(), "outer failure thrown at inner exit");

    ctx.exit().unwrap();
    assert_eq!(
        ctx.host().thrown(),
        &[ForeignFailure::new("java/lang/RuntimeException", "no local frame to pop")]
    );
}

#[test]
fn test_nested_raise_delivered_at_its_own_exit() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    ctx.enter();
    ctx.raise(ForeignFailure::new("java/lang/IllegalArgumentException", "inner").into())
        .unwrap();
    ctx.exit().unwrap();
    assert_eq!(ctx.host().thrown().len(), 1);

    ctx.exit().unwrap();
    assert_eq!(ctx.host().thrown().len(), 1, "outer entry raised nothing");
}

#[test]
fn test_outer_pending_failure_restored_after_nested_entry() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    ctx.host_mut()
        .throwing("fail", "java/lang/IllegalStateException", "outer", RawValue::ZERO);
    ctx.host_mut().returning("ok", RawValue::ZERO);

    ctx.enter();
    assert!(ctx.call_static(&desc("fail", "()V"), &[]).is_err());

    ctx.enter();
    assert!(ctx.pending().is_none());
    ctx.exit().unwrap();

    assert_eq!(ctx.pending().map(|f| f.message.as_str()), Some("outer"));
    assert_eq!(
        ctx.call_static(&desc("ok", "()V"), &[]),
        Err(BridgeError::ReentrantPendingFailure)
    );
    assert!(ctx.acknowledge().is_some());
    ctx.exit().unwrap();
}

#[test]
fn test_pop_local_frame_with_invalid_keep_still_pops() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);

    ctx.enter();
    let stale = ctx.acquire_local(RawRef::from_usize(0x10)).unwrap();
    ctx.delete_local(stale).unwrap();

    ctx.push_local_frame(4).unwrap();
    let scratch = ctx.acquire_local(RawRef::from_usize(0x20)).unwrap();
    assert_eq!(
        ctx.pop_local_frame(stale),
        Err(BridgeError::InvalidHandle(stale))
    );
    assert!(!ctx.is_valid(&scratch));
    // Only the entry frame is left.
    assert_eq!(
        ctx.pop_local_frame(ForeignHandle::NULL),
        Err(BridgeError::NoLocalFrame)
    );
    assert_eq!(ctx.exit(), Ok(0));
}

#[test]
fn test_locals_are_context_scoped() {
    let bridge = Bridge::default();
    let mut a = attach(&bridge);
    let mut b = attach(&bridge);

    a.enter();
    b.enter();
    let local = a.acquire_local(RawRef::from_usize(0x1)).unwrap();
    assert!(!b.is_valid(&local));
    assert_eq!(b.delete_local(local), Err(BridgeError::InvalidHandle(local)));

    let global = a.promote(local, Lifetime::Global).unwrap();
    assert!(b.is_valid(&global), "globals are visible across contexts");
    b.release(global).unwrap();
    assert!(!a.is_valid(&global));
    a.exit().unwrap();
    b.exit().unwrap();
}

#[test]
fn test_globals_shared_across_threads() {
    let bridge = Bridge::default();
    let global = {
        let mut ctx = attach(&bridge);
        ctx.with_entry(|ctx| {
            let local = ctx.acquire_local(RawRef::from_usize(0x700))?;
            ctx.promote(local, Lifetime::Global)
        })
        .unwrap()
    };

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let bridge = bridge.clone();
            std::thread::spawn(move || {
                let mut ctx = bridge.attach(SimulatedHost::new(), RawEnv::null());
                ctx.with_entry(|ctx| {
                    assert!(ctx.is_valid(&global));
                    let local = ctx.promote(global, Lifetime::Local)?;
                    let extra = ctx.promote(local, Lifetime::Global)?;
                    assert_ne!(extra, global, "thread {} got a shared slot", i);
                    ctx.release(extra)
                })
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked").unwrap();
    }

    assert_eq!(bridge.registry().stats().live_globals, 1);
    bridge.registry().release(global).unwrap();
    assert_eq!(bridge.registry().outstanding(), Vec::new());
}

#[test]
fn test_leak_detection() {
    let bridge = Bridge::default();
    let mut ctx = attach(&bridge);
    ctx.enter();
    let local = ctx.acquire_local(RawRef::from_usize(0x1)).unwrap();
    let leaked = ctx.promote(local, Lifetime::Weak).unwrap();
    ctx.exit().unwrap();

    let stats = bridge.registry().stats();
    assert_eq!(stats.live_weaks, 1);
    assert_eq!(stats.acquired - stats.released, 1);
    assert_eq!(bridge.registry().outstanding(), vec![leaked]);
}

proptest! {
    #[test]
    fn prop_locals_invalid_after_scope(count in 0usize..64) {
        let bridge = Bridge::default();
        let mut ctx = attach(&bridge);

        ctx.enter();
        let handles: Vec<ForeignHandle> = (0..count)
            .map(|i| ctx.acquire_local(RawRef::from_usize(0x1000 + i * 8)).unwrap())
            .collect();
        prop_assert!(handles.iter().all(|h| ctx.is_valid(h)));
        prop_assert_eq!(ctx.exit(), Ok(count));
        prop_assert!(handles.iter().all(|h| !ctx.is_valid(h)));
    }

    #[test]
    fn prop_boolean_decodes_nonzero_as_true(b in any::<u8>()) {
        prop_assert_eq!(bool::from_raw(RawValue::from_bits(b as u64)), b != 0);
        prop_assert_eq!(bool::from_foreign(b).to_foreign(), if b != 0 { 1 } else { 0 });
    }

    #[test]
    fn prop_long_roundtrip(v in any::<i64>()) {
        prop_assert_eq!(i64::from_raw(v.to_raw()), v);
    }

    #[test]
    fn prop_double_roundtrip_bits(bits in any::<u64>()) {
        let v = f64::from_bits(bits);
        prop_assert_eq!(f64::from_raw(v.to_raw()).to_bits(), bits);
    }
}
