mod common;

use block_canvas::{BlockError, BlockFlags, BlockTemplate, RejectReason, WorkspaceEvent};
use common::*;
use glam::Vec2;

#[test]
fn test_connect_next_to_previous() {
    // 1. Two statement roots
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 300.0);

    // 2. Connect B below A
    ctrl.connect(previous(&ctrl, b), next(&ctrl, a)).unwrap();

    // 3. Verify
    let ws = ctrl.workspace();
    assert!(ws.is_root_block(a));
    assert!(!ws.is_root_block(b));
    assert_eq!(ws.graph().parent_block(b), Some(a));
    assert_eq!(position(&ctrl, b), Vec2::new(0.0, 40.0));
    assert_eq!(conn_position(&ctrl, previous(&ctrl, b)), conn_position(&ctrl, next(&ctrl, a)));
    assert_consistent(&ctrl);
}

#[test]
fn test_splice_statement_between_blocks() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    let c = add_block(&mut ctrl, "statement_no_input", 600.0, 0.0);
    ctrl.connect(previous(&ctrl, c), next(&ctrl, a)).unwrap();

    ctrl.connect(previous(&ctrl, b), next(&ctrl, a)).unwrap();

    let ws = ctrl.workspace();
    let graph = ws.graph();
    assert_eq!(graph.next_block(a), Some(b));
    assert_eq!(graph.next_block(b), Some(c));
    assert_eq!(graph.parent_block(c), Some(b));
    assert!(!ws.is_root_block(b));
    assert!(!ws.is_root_block(c));
    assert_eq!(ws.root_blocks(), &[a]);
    assert_eq!(position(&ctrl, c), Vec2::new(0.0, 80.0));
    assert_consistent(&ctrl);
}

#[test]
fn test_splice_stack_keeps_order() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let tail = add_block(&mut ctrl, "statement_no_input", 0.0, 300.0);
    let b1 = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    let b2 = add_block(&mut ctrl, "statement_no_input", 300.0, 300.0);
    ctrl.connect(previous(&ctrl, tail), next(&ctrl, a)).unwrap();
    ctrl.connect(previous(&ctrl, b2), next(&ctrl, b1)).unwrap();

    // The whole B stack goes between A and its tail.
    ctrl.connect(previous(&ctrl, b1), next(&ctrl, a)).unwrap();

    let graph = ctrl.workspace().graph();
    let mut order = vec![a];
    while let Some(next) = graph.next_block(*order.last().unwrap()) {
        order.push(next);
    }
    assert_eq!(order, vec![a, b1, b2, tail]);
    assert_consistent(&ctrl);
}

#[test]
fn test_splice_value_into_input_chain() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "simple_input_output", 0.0, 0.0);
    let b = add_block(&mut ctrl, "simple_input_output", 300.0, 0.0);
    let c = add_block(&mut ctrl, "output_no_input", 600.0, 0.0);
    ctrl.connect(output(&ctrl, c), input(&ctrl, a, "VALUE")).unwrap();

    ctrl.connect(output(&ctrl, b), input(&ctrl, a, "VALUE")).unwrap();

    let ws = ctrl.workspace();
    assert_eq!(ws.graph().target_block(input(&ctrl, a, "VALUE")), Some(b));
    assert_eq!(ws.graph().target_block(input(&ctrl, b, "VALUE")), Some(c));
    assert!(!ws.is_root_block(c));
    assert_eq!(position(&ctrl, c), Vec2::new(240.0, 0.0));
    assert_consistent(&ctrl);
}

#[test]
fn test_bump_value_block_without_free_input() {
    // 1. A holds C in its only value input
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "simple_input_output", 0.0, 0.0);
    let c = add_block(&mut ctrl, "simple_input_output", 500.0, 0.0);
    let d = add_block(&mut ctrl, "output_no_input", 0.0, 500.0);
    ctrl.connect(output(&ctrl, c), input(&ctrl, a, "VALUE")).unwrap();
    ctrl.drain_events();

    // 2. D has no inputs, so C cannot be re-attached
    let socket = input(&ctrl, a, "VALUE");
    ctrl.connect(output(&ctrl, d), socket).unwrap();

    // 3. Verify D took the slot and C was pushed out of snapping range
    let ws = ctrl.workspace();
    assert_eq!(ws.graph().target_block(socket), Some(d));
    assert!(ws.is_root_block(c));
    assert!(!ctrl.workspace().graph().connection(output(&ctrl, c)).unwrap().is_connected());

    let radius = ctrl.config.snap_radius;
    let bumped_to = conn_position(&ctrl, output(&ctrl, c));
    let d_at = conn_position(&ctrl, output(&ctrl, d));
    assert!(bumped_to.distance(d_at) >= radius);
    assert_eq!(bumped_to, conn_position(&ctrl, socket) + Vec2::splat(radius));

    let events = ctrl.drain_events();
    assert!(events.contains(&WorkspaceEvent::RootAdded(c)));
    assert!(events.contains(&WorkspaceEvent::Bumped { block: c, from: socket }));
    assert_consistent(&ctrl);
}

#[test]
fn test_bump_statement_without_next() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_input_no_next", 0.0, 0.0);
    let old = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    let new = add_block(&mut ctrl, "statement_input_no_next", 600.0, 0.0);
    let socket = input(&ctrl, a, "STATEMENT");
    ctrl.connect(previous(&ctrl, old), socket).unwrap();
    assert_eq!(position(&ctrl, old), Vec2::new(24.0, 40.0));

    ctrl.connect(previous(&ctrl, new), socket).unwrap();

    let ws = ctrl.workspace();
    assert_eq!(ws.graph().target_block(socket), Some(new));
    assert!(ws.is_root_block(old));
    let moved = conn_position(&ctrl, previous(&ctrl, old)).distance(conn_position(&ctrl, socket));
    assert!(moved >= ctrl.config.snap_radius);
    assert_consistent(&ctrl);
}

#[test]
fn test_connect_from_next_attaches_root_below() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);

    ctrl.connect(next(&ctrl, a), previous(&ctrl, b)).unwrap();

    assert_eq!(ctrl.workspace().graph().next_block(a), Some(b));
    assert_eq!(ctrl.workspace().root_blocks(), &[a]);
    assert_consistent(&ctrl);
}

#[test]
fn test_connect_moves_source_from_old_parent() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    let c = add_block(&mut ctrl, "statement_no_input", 600.0, 0.0);
    ctrl.connect(previous(&ctrl, c), next(&ctrl, a)).unwrap();

    ctrl.connect(previous(&ctrl, c), next(&ctrl, b)).unwrap();

    let graph = ctrl.workspace().graph();
    assert_eq!(graph.next_block(a), None);
    assert_eq!(graph.next_block(b), Some(c));
    assert_eq!(ctrl.workspace().root_blocks(), &[a, b]);
    assert_consistent(&ctrl);
}

#[test]
fn test_illegal_connections_leave_workspace_untouched() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    let value = add_block(&mut ctrl, "number_output", 600.0, 0.0);
    let say = add_block(&mut ctrl, "string_input", 900.0, 0.0);
    ctrl.connect(previous(&ctrl, b), next(&ctrl, a)).unwrap();
    let before = ctrl.workspace().save();
    ctrl.drain_events();

    let cases = [
        (next(&ctrl, a), previous(&ctrl, a), RejectReason::SelfConnection),
        (output(&ctrl, value), next(&ctrl, a), RejectReason::WrongType),
        (output(&ctrl, value), input(&ctrl, say, "TEXT"), RejectReason::ChecksFailed),
        (previous(&ctrl, b), next(&ctrl, a), RejectReason::AlreadyLinked),
        (previous(&ctrl, a), next(&ctrl, b), RejectReason::CreatesCycle),
        (next(&ctrl, say), previous(&ctrl, b), RejectReason::Occupied),
    ];
    for (source, target, expected) in cases {
        match ctrl.connect(source, target) {
            Err(BlockError::IllegalConnection { reason, .. }) => assert_eq!(reason, expected),
            other => panic!("Expected {expected:?}, got {other:?}"),
        }
    }

    assert_eq!(ctrl.workspace().save(), before);
    assert!(ctrl.drain_events().is_empty());
    assert_consistent(&ctrl);
}

#[test]
fn test_unmovable_occupant_rejects_splice() {
    let mut ctrl = controller();
    ctrl.factory_mut().register(
        BlockTemplate::new("locked")
            .with_previous(&[])
            .with_next(&[])
            .with_flags(BlockFlags::DELETABLE),
    );
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let locked = add_block(&mut ctrl, "locked", 300.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 600.0, 0.0);
    ctrl.connect(previous(&ctrl, locked), next(&ctrl, a)).unwrap();

    let err = ctrl.connect(previous(&ctrl, b), next(&ctrl, a)).unwrap_err();
    assert!(matches!(
        err,
        BlockError::IllegalConnection {
            reason: RejectReason::Unmovable,
            ..
        }
    ));
    assert_eq!(ctrl.workspace().graph().next_block(a), Some(locked));
}

#[test]
fn test_extract_block_as_root_keeps_children() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    let c = add_block(&mut ctrl, "statement_no_input", 600.0, 0.0);
    ctrl.connect(previous(&ctrl, b), next(&ctrl, a)).unwrap();
    ctrl.connect(previous(&ctrl, c), next(&ctrl, b)).unwrap();

    ctrl.extract_block_as_root(b).unwrap();

    let ws = ctrl.workspace();
    assert!(ws.is_root_block(b));
    assert_eq!(ws.graph().next_block(a), None);
    assert_eq!(ws.graph().next_block(b), Some(c));
    assert!(!ws.is_root_block(c));

    // Already a root: nothing happens.
    ctrl.drain_events();
    ctrl.extract_block_as_root(b).unwrap();
    assert!(ctrl.drain_events().is_empty());
    assert_consistent(&ctrl);
}

#[test]
fn test_remove_from_root_only_touches_registry() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);

    assert!(ctrl.remove_from_root(a));
    assert!(!ctrl.remove_from_root(a));
    assert!(ctrl.workspace().graph().contains_block(a));
    assert!(ctrl.workspace().root_blocks().is_empty());

    // The block can be registered again.
    ctrl.add_root_block(a).unwrap();
    assert!(matches!(ctrl.add_root_block(a), Err(BlockError::AlreadyRoot(_))));
}

#[test]
fn test_remove_block_tree() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    let c = add_block(&mut ctrl, "statement_no_input", 600.0, 0.0);
    ctrl.connect(previous(&ctrl, b), next(&ctrl, a)).unwrap();
    ctrl.connect(previous(&ctrl, c), next(&ctrl, b)).unwrap();
    let b_next = next(&ctrl, b);

    let orphaned = ctrl.remove_block_tree(b).unwrap();

    assert!(orphaned.is_empty());
    let ws = ctrl.workspace();
    assert_eq!(ws.graph().block_count(), 1);
    assert!(!ws.graph().contains_block(c));
    assert!(!ws.graph().connection(next(&ctrl, a)).unwrap().is_connected());
    assert!(ws.graph().connection(b_next).is_none());
    assert_eq!(ws.connection_manager().len(), 2);
    assert_consistent(&ctrl);
}

#[test]
fn test_remove_block_tree_respects_deletable() {
    let mut ctrl = controller();
    ctrl.factory_mut()
        .register(BlockTemplate::new("pinned").with_previous(&[]).with_flags(BlockFlags::MOVABLE));
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let pinned = add_block(&mut ctrl, "pinned", 300.0, 0.0);
    ctrl.connect(previous(&ctrl, pinned), next(&ctrl, a)).unwrap();

    match ctrl.remove_block_tree(a) {
        Err(BlockError::NotDeletable(id)) => assert_eq!(id, pinned),
        other => panic!("Expected NotDeletable, got {other:?}"),
    }
    assert_eq!(ctrl.workspace().graph().block_count(), 2);
}

#[test]
fn test_move_block_moves_tree() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    ctrl.connect(previous(&ctrl, b), next(&ctrl, a)).unwrap();

    ctrl.move_block(a, Vec2::new(100.0, 200.0)).unwrap();

    assert_eq!(position(&ctrl, b), Vec2::new(100.0, 240.0));
    assert!(matches!(ctrl.move_block(b, Vec2::ZERO), Err(BlockError::NotRoot(_))));
    assert_consistent(&ctrl);
}

#[test]
fn test_set_connection_offsets_relays_out_children() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    ctrl.connect(previous(&ctrl, b), next(&ctrl, a)).unwrap();

    let a_next = next(&ctrl, a);
    ctrl.set_connection_offsets(a, &[(a_next, Vec2::new(0.0, 64.0))]).unwrap();
    assert_eq!(position(&ctrl, b), Vec2::new(0.0, 64.0));

    // Connections of other blocks are rejected.
    let b_next = next(&ctrl, b);
    assert!(matches!(
        ctrl.set_connection_offsets(a, &[(b_next, Vec2::ZERO)]),
        Err(BlockError::UnknownConnection(_))
    ));
    assert_consistent(&ctrl);
}

#[test]
fn test_connect_detached_block_joins_workspace() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let detached = ctrl.obtain_block("statement_no_input").unwrap();
    assert!(!ctrl.workspace().contains(detached));
    assert!(!ctrl.workspace().connection_manager().contains(ctrl.workspace().graph(), next(&ctrl, detached)));

    ctrl.connect(previous(&ctrl, detached), next(&ctrl, a)).unwrap();

    let ws = ctrl.workspace();
    assert!(ws.contains(detached));
    assert!(ws.connection_manager().contains(ws.graph(), next(&ctrl, detached)));
    assert_consistent(&ctrl);
}

#[test]
fn test_events_describe_connect() {
    let mut ctrl = controller();
    let a = add_block(&mut ctrl, "statement_no_input", 0.0, 0.0);
    let b = add_block(&mut ctrl, "statement_no_input", 300.0, 0.0);
    ctrl.drain_events();

    let child = previous(&ctrl, b);
    let parent = next(&ctrl, a);
    ctrl.connect(child, parent).unwrap();

    let events = ctrl.drain_events();
    assert!(events.contains(&WorkspaceEvent::RootRemoved(b)));
    assert!(events.contains(&WorkspaceEvent::Connected { child, parent }));
    assert!(events.contains(&WorkspaceEvent::BlockMoved {
        block: b,
        position: Vec2::new(0.0, 40.0)
    }));
}
