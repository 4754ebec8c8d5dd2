use tracing::{debug, info};
use vedit_config::{AppConfig, MidpointStrategy};
use vedit_core::geometry::LatLng;
use vedit_core::ring::RingEvent;
use vedit_core::vertex::VertexId;
use vedit_engine::errors::EngineError;
use vedit_engine::events::{EditEvent, EventFilter};
use vedit_engine::seed::Seed;
use vedit_engine::session::{EditSession, MidpointMode, SessionSettings};

pub fn session_settings(config: &AppConfig, midpoints: Option<MidpointMode>) -> SessionSettings {
    let configured = match config.editor.midpoints {
        MidpointStrategy::Auto => MidpointMode::Auto,
        MidpointStrategy::Manual => MidpointMode::Manual,
    };
    SessionSettings {
        midpoints: midpoints.unwrap_or(configured),
        history_depth: config.editor.history_limit(),
    }
}

/// 简易 CLI 演示：以配置中的几何构建会话，执行一段脚本化编辑并打印每一步的顶点序列。
pub fn run(config: &AppConfig, settings: SessionSettings) -> Result<(), EngineError> {
    let seed = Seed::from_positions(config.demo.points.iter().copied())
        .closed(config.demo.close_geometry);
    let mut session = EditSession::from_seed(&seed, settings)?;
    session.subscribe(EventFilter::All, log_event);

    println!("Rust 版顶点编辑 CLI 演示（中点模式: {:?}）", settings.midpoints);
    print_ring("初始", &session);

    let primaries = primary_ids(&session);
    let Some(&first) = primaries.first() else {
        return Ok(());
    };

    // 拖拽：先预览再以起点提交。
    let start = session.vertex(first)?.position;
    session.preview_position(first, offset(start, 0.002, -0.002));
    session.move_vertex(first, start);
    print_ring("移动首个主顶点", &session);

    let auxiliary = session
        .ring()
        .iter()
        .find(|(_, vertex)| vertex.is_auxiliary)
        .map(|(_, vertex)| vertex.id);
    match auxiliary {
        Some(id) => {
            session.promote(id);
            print_ring("提升辅助点", &session);
        }
        None => {
            if let Some(id) = session.insert_on_segment(first, offset(start, 0.0, 0.005)) {
                info!(id = id.get(), "插入主顶点");
            }
            print_ring("在首段插入顶点", &session);
        }
    }

    if let Some(&second) = primaries.get(1) {
        session.begin_transaction();
        session.remove_vertex(second);
        if session.ring().is_circular() {
            session.break_at(first);
        } else {
            session.close();
        }
        session.commit_transaction();
        print_ring("事务：删除并切换闭合状态", &session);
    }

    session.undo();
    print_ring("撤销事务", &session);
    session.redo();
    print_ring("重做事务", &session);

    while session.undo() {}
    print_ring("全部撤销", &session);
    println!(
        "撤销栈深度={}, 重做栈深度={}",
        session.timeline().undo_depth(),
        session.timeline().redo_depth()
    );
    Ok(())
}

fn primary_ids(session: &EditSession) -> Vec<VertexId> {
    session
        .ring()
        .iter()
        .filter(|(_, vertex)| vertex.is_primary())
        .map(|(_, vertex)| vertex.id)
        .collect()
}

fn offset(position: LatLng, lat: f64, lng: f64) -> LatLng {
    LatLng::new(position.lat() + lat, position.lng() + lng)
}

fn print_ring(label: &str, session: &EditSession) {
    let ring = session.ring();
    let vertices: Vec<String> = ring
        .iter()
        .map(|(_, vertex)| {
            let marker = if vertex.is_auxiliary { "·" } else { "●" };
            format!(
                "{marker}{}({:.4}, {:.4})",
                vertex.id,
                vertex.position.lat(),
                vertex.position.lng()
            )
        })
        .collect();
    println!(
        "[{label}] 顶点数={}, 闭合={}, 模式={:?}",
        ring.len(),
        if ring.is_circular() { "是" } else { "否" },
        session.mode()
    );
    println!("  {}", vertices.join(" -> "));
}

fn log_event(event: &EditEvent) {
    match event {
        EditEvent::Ring(RingEvent::Changed { size, .. }) => debug!(size, "环结构变化"),
        EditEvent::Ring(other) => info!(event = ?other, "环通知"),
        EditEvent::UndoDepthChanged(depth) => debug!(depth, "撤销栈深度变化"),
        EditEvent::RedoDepthChanged(depth) => debug!(depth, "重做栈深度变化"),
    }
}
