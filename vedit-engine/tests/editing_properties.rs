use std::cell::RefCell;
use std::rc::Rc;

use vedit_core::geometry::LatLng;
use vedit_core::ring::{RingEvent, VertexRing};
use vedit_core::vertex::VertexId;
use vedit_engine::command::{
    AddVertex, BreakRing, CloseRing, Command, CommandContext, CompoundCommand, DrawMode,
    EditCommand, InsertVertexOnSegment, MoveVertex, PromoteAuxiliaryToPrimary, RemoveVertex,
};
use vedit_engine::errors::{EngineError, SeedError};
use vedit_engine::events::{EditEvent, EventCategory, EventFilter};
use vedit_engine::seed::Seed;
use vedit_engine::session::{EditSession, MidpointMode, SessionSettings};

const PENTAGON: [[f64; 2]; 5] = [
    [0.0, 0.0],
    [0.0, 4.0],
    [3.0, 6.0],
    [6.0, 4.0],
    [6.0, 0.0],
];

fn settings(midpoints: MidpointMode) -> SessionSettings {
    SessionSettings {
        midpoints,
        history_depth: None,
    }
}

fn sequence(ring: &VertexRing) -> Vec<(VertexId, bool)> {
    ring.iter()
        .map(|(_, vertex)| (vertex.id, vertex.is_auxiliary))
        .collect()
}

/// 顶点序列、坐标与闭合状态的完整快照。
fn snapshot(ring: &VertexRing) -> (Vec<(VertexId, bool, LatLng)>, bool) {
    (
        ring.iter()
            .map(|(_, vertex)| (vertex.id, vertex.is_auxiliary, vertex.position))
            .collect(),
        ring.is_circular(),
    )
}

fn links_agree_with_is_circular(ring: &VertexRing) -> bool {
    let (Some(head), Some(tail)) = (ring.head(), ring.tail()) else {
        return !ring.is_circular();
    };
    let head_prev = ring.node(head).and_then(|node| node.prev());
    let tail_next = ring.node(tail).and_then(|node| node.next());
    ring.is_circular() == (head_prev == Some(tail) && tail_next == Some(head))
}

fn assert_aux_balance(ring: &VertexRing) {
    let primaries = ring.primary_count();
    let expected = if ring.is_circular() {
        primaries
    } else {
        primaries.saturating_sub(1)
    };
    assert_eq!(ring.auxiliary_count(), expected, "aux balance broken");
}

fn open_session(midpoints: MidpointMode, points: &[[f64; 2]]) -> (EditSession, Vec<VertexId>) {
    let mut session = EditSession::new(settings(midpoints));
    let ids = points
        .iter()
        .filter_map(|&point| session.add_vertex(point.into()))
        .collect();
    (session, ids)
}

#[test]
fn n_commits_then_n_undos_restore_sequence() {
    for midpoints in [MidpointMode::Auto, MidpointMode::Manual] {
        let seed = Seed::from_positions(PENTAGON);
        let mut session = EditSession::from_seed(&seed, settings(midpoints)).unwrap();
        let initial = sequence(session.ring());
        let primaries: Vec<VertexId> = session
            .ring()
            .iter()
            .filter(|(_, vertex)| vertex.is_primary())
            .map(|(_, vertex)| vertex.id)
            .collect();

        session.add_vertex(LatLng::new(-2.0, 2.0));
        session.close();
        session.move_vertex_to(primaries[2], LatLng::new(4.0, 7.0));
        session.remove_vertex(primaries[1]);
        session.insert_on_segment(primaries[3], LatLng::new(7.0, 2.0));
        session.break_at(primaries[0]);
        let committed = session.timeline().undo_depth();
        assert_eq!(committed, 6);

        for _ in 0..committed {
            assert!(session.undo());
            session.ring().check_invariants().unwrap();
        }
        assert_eq!(sequence(session.ring()), initial);
        assert_eq!(session.mode(), DrawMode::Open);
    }
}

#[test]
fn is_circular_matches_links_after_close_and_break() {
    for midpoints in [MidpointMode::Auto, MidpointMode::Manual] {
        let (mut session, ids) = open_session(midpoints, &PENTAGON);
        assert!(links_agree_with_is_circular(session.ring()));
        assert!(session.close());
        assert!(session.ring().is_circular());
        assert!(links_agree_with_is_circular(session.ring()));
        assert!(session.break_at(ids[2]));
        assert!(!session.ring().is_circular());
        assert!(links_agree_with_is_circular(session.ring()));
    }
}

#[test]
fn execute_undo_execute_matches_single_execute() {
    for auto in [true, false] {
        let build = || {
            let mut ring = VertexRing::new(auto);
            let mut mode = DrawMode::Open;
            let mut context = CommandContext {
                ring: &mut ring,
                mode: &mut mode,
            };
            for point in PENTAGON {
                AddVertex::new(point.into()).execute(&mut context);
            }
            CloseRing::new().execute(&mut context);
            (ring, mode)
        };

        let (probe, _) = build();
        let keys: Vec<_> = probe.iter().map(|(key, _)| key).collect();
        let primary = keys[2];
        let primary_id = probe.vertex(primary).unwrap().id;
        let start = probe.vertex(primary).unwrap().position;
        let aux = probe
            .iter()
            .find(|(_, vertex)| vertex.is_auxiliary)
            .map(|(key, _)| key);

        let mut commands: Vec<Command> = vec![
            AddVertex::new(LatLng::new(-1.0, 2.0)).into(),
            InsertVertexOnSegment::new(LatLng::new(0.0, 2.0), keys[0]).into(),
            MoveVertex::to(primary, start, LatLng::new(9.0, 9.0)).into(),
            RemoveVertex::new(&probe, primary_id).into(),
            BreakRing::new(keys[1]).into(),
            CompoundCommand::from_iter([
                Command::from(MoveVertex::to(primary, start, LatLng::new(1.0, 1.0))),
                Command::from(BreakRing::new(primary)),
            ])
            .into(),
        ];
        if let Some(aux) = aux {
            commands.push(PromoteAuxiliaryToPrimary::new(aux).into());
        }

        for command in commands {
            let (mut once_ring, mut once_mode) = build();
            let mut once = command.clone();
            once.execute(&mut CommandContext {
                ring: &mut once_ring,
                mode: &mut once_mode,
            });

            let (mut ring, mut mode) = build();
            let mut replayed = command;
            let mut context = CommandContext {
                ring: &mut ring,
                mode: &mut mode,
            };
            replayed.execute(&mut context);
            replayed.undo(&mut context);
            replayed.execute(&mut context);

            assert_eq!(
                snapshot(&ring),
                snapshot(&once_ring),
                "{} diverged",
                replayed.kind().name()
            );
            assert_eq!(mode, once_mode);
            ring.check_invariants().unwrap();
        }
    }
}

#[test]
fn auto_mode_keeps_aux_balance_through_editing() {
    let (mut session, ids) = open_session(MidpointMode::Auto, &PENTAGON);
    assert_aux_balance(session.ring());

    session.remove_vertex(ids[1]);
    assert_aux_balance(session.ring());
    assert!(session.close());
    assert_aux_balance(session.ring());
    session.remove_vertex(ids[0]);
    assert_aux_balance(session.ring());

    let aux = session
        .ring()
        .iter()
        .find(|(_, vertex)| vertex.is_auxiliary)
        .map(|(_, vertex)| vertex.id)
        .unwrap();
    assert!(session.promote(aux));
    assert_aux_balance(session.ring());
    session.break_at(ids[3]);
    assert_aux_balance(session.ring());

    while session.undo() {
        assert_aux_balance(session.ring());
    }
    while session.redo() {
        assert_aux_balance(session.ring());
    }
}

#[test]
fn closed_four_point_seed_builds_six_node_ring() {
    let seed = Seed::from_positions([[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0]]).closed(true);
    let session = EditSession::from_seed(&seed, settings(MidpointMode::Auto)).unwrap();
    assert_eq!(session.ring().len(), 6);
    assert!(session.ring().is_circular());
}

#[test]
fn removing_from_manual_pair_leaves_unlinked_singleton() {
    let (mut session, ids) = open_session(MidpointMode::Manual, &PENTAGON[..2]);
    assert!(session.remove_vertex(ids[1]));

    let ring = session.ring();
    assert_eq!(ring.len(), 1);
    assert_eq!(ring.head(), ring.tail());
    let node = ring.node(ring.head().unwrap()).unwrap();
    assert_eq!(node.prev(), None);
    assert_eq!(node.next(), None);
}

#[test]
fn empty_seed_is_rejected() {
    let err = EditSession::from_seed(&Seed::default(), settings(MidpointMode::Auto)).unwrap_err();
    assert!(matches!(err, EngineError::Seed(SeedError::EmptySeed)));
    assert_eq!(err.to_string(), "seed contains no vertices");
}

#[test]
fn commit_after_undo_discards_redo() {
    let (mut session, _) = open_session(MidpointMode::Manual, &PENTAGON[..2]);
    assert!(session.undo());
    assert!(session.can_redo());
    session.add_vertex(LatLng::new(5.0, 5.0));
    assert!(!session.can_redo());
    assert!(!session.redo());
}

#[test]
fn invariants_hold_after_noops() {
    let (mut session, ids) = open_session(MidpointMode::Auto, &PENTAGON[..2]);
    let before = snapshot(session.ring());
    let depth = session.timeline().undo_depth();

    let missing = VertexId::new(1_000);
    session.remove_vertex(missing);
    session.promote(ids[0]);
    session.break_at(ids[0]);
    session.close();
    session.commit(BreakRing::new(session.ring().head().unwrap()));

    assert_eq!(snapshot(session.ring()), before);
    assert_eq!(session.timeline().undo_depth(), depth);
    session.ring().check_invariants().unwrap();
}

#[test]
fn handles_taken_before_reset_do_not_reach_new_vertices() {
    let (mut session, ids) = open_session(MidpointMode::Manual, &PENTAGON[..2]);
    let stale = session.ring().key_of(ids[0]).unwrap();

    session.reset();
    let fresh = session.add_vertex(LatLng::new(7.0, 7.0)).unwrap();
    let before = snapshot(session.ring());

    session.commit(MoveVertex::to(stale, LatLng::new(7.0, 7.0), LatLng::new(-3.0, -3.0)));
    assert_eq!(snapshot(session.ring()), before);
    assert_eq!(session.vertex(fresh).unwrap().position, LatLng::new(7.0, 7.0));
    assert_eq!(session.timeline().undo_depth(), 1);
    session.ring().check_invariants().unwrap();
}

#[test]
fn notifications_follow_structural_work() {
    let (mut session, ids) = open_session(MidpointMode::Auto, &PENTAGON[..3]);
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    session.subscribe(EventFilter::All, move |event| sink.borrow_mut().push(event.clone()));

    let sizes = Rc::new(RefCell::new(Vec::new()));
    let size_sink = Rc::clone(&sizes);
    session.subscribe(
        EventFilter::Categories(vec![EventCategory::Ring]),
        move |event| {
            if let EditEvent::Ring(RingEvent::Changed { size, .. }) = event {
                size_sink.borrow_mut().push(*size);
            }
        },
    );

    assert!(session.close());
    let events = log.borrow().clone();
    assert!(events.contains(&EditEvent::Ring(RingEvent::Closed)));
    assert_eq!(events.last(), Some(&EditEvent::UndoDepthChanged(4)));
    assert_eq!(sizes.borrow().last(), Some(&6));

    log.borrow_mut().clear();
    session.undo();
    let events = log.borrow().clone();
    let tail: Vec<_> = events
        .iter()
        .filter(|event| event.category() == EventCategory::History)
        .cloned()
        .collect();
    assert_eq!(
        tail,
        vec![EditEvent::UndoDepthChanged(3), EditEvent::RedoDepthChanged(1)]
    );
    assert!(matches!(events.first(), Some(EditEvent::Ring(_))));

    log.borrow_mut().clear();
    session.redo();
    session.move_vertex_to(ids[1], LatLng::new(1.0, 5.0));
    assert!(log.borrow().iter().any(|event| matches!(
        event,
        EditEvent::Ring(RingEvent::VertexMoved { id, .. }) if *id == ids[1]
    )));
}

#[test]
fn transactions_undo_as_one_step() {
    let (mut session, ids) = open_session(MidpointMode::Manual, &PENTAGON);
    let before = snapshot(session.ring());
    let depth = session.timeline().undo_depth();

    session.begin_transaction();
    session.move_vertex_to(ids[0], LatLng::new(-1.0, -1.0));
    session.remove_vertex(ids[4]);
    session.close();
    assert!(session.commit_transaction());
    assert_eq!(session.timeline().undo_depth(), depth + 1);

    assert!(session.undo());
    assert_eq!(snapshot(session.ring()), before);
    assert!(session.redo());
    assert!(session.ring().is_circular());
    assert_eq!(session.ring().len(), 4);
}
