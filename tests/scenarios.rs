//! End-to-end scenarios: editing, generation, persistence and the device session.

use async_trait::async_trait;
use longboard::device::SerialLines;
use longboard::serializer;
use longboard::{
    compile_workspace, BlockRegistry, BoardDescriptor, BoardRegistry, DeviceBridge, DeviceError,
    DeviceSession, GraphError, PortId, RootKind, SessionState, StatementTarget, UploadOutcome,
    Workspace,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn workspace(board: &str) -> Workspace {
    Workspace::new(Arc::new(BlockRegistry::builtin()), board).unwrap()
}

/// Builds `pinMode(13, OUTPUT)` followed by `digitalWrite(13, HIGH)` and
/// returns the head of the chain.
fn blink_chain(ws: &mut Workspace) -> Result<longboard::BlockId, GraphError> {
    let mode = ws.create_block("pin_mode")?;
    ws.set_field(mode, "PIN", "13")?;
    ws.set_field(mode, "MODE", "OUTPUT")?;
    let write = ws.create_block("digital_write")?;
    ws.set_field(write, "PIN", "13")?;
    ws.set_field(write, "STATE", "HIGH")?;
    ws.connect_statement(mode, StatementTarget::Next, write)?;
    Ok(mode)
}

#[test]
fn empty_workspace_generates_skeleton() {
    init_tracing();
    let ws = workspace("nano");
    assert_eq!(
        compile_workspace(&ws).unwrap(),
        "void setup() {\n  // (no blocks)\n}\n\nvoid loop() {\n  // (no blocks)\n}\n"
    );
}

#[test]
fn chained_statements_keep_link_order() {
    init_tracing();
    let mut ws = workspace("uno");
    let lp = ws.root(RootKind::Loop).unwrap();
    let head = blink_chain(&mut ws).unwrap();
    ws.connect_statement(lp, StatementTarget::slot("DO"), head).unwrap();

    let code = compile_workspace(&ws).unwrap();
    assert!(code.ends_with(
        "void loop() {\n  pinMode(13, OUTPUT);\n  digitalWrite(13, HIGH);\n}\n"
    ));
}

#[test]
fn repeat_wraps_its_chain_one_level_deeper() {
    init_tracing();
    let mut ws = workspace("uno");
    let lp = ws.root(RootKind::Loop).unwrap();
    let repeat = ws.create_block("repeat_times").unwrap();
    ws.set_field(repeat, "TIMES", 5u64).unwrap();
    let head = blink_chain(&mut ws).unwrap();
    ws.connect_statement(repeat, StatementTarget::slot("DO"), head).unwrap();
    ws.connect_statement(lp, StatementTarget::slot("DO"), repeat).unwrap();

    let code = compile_workspace(&ws).unwrap();
    assert!(code.contains(
        "void loop() {\n  for (unsigned long i = 0; i < 5; i++) {\n    pinMode(13, OUTPUT);\n    digitalWrite(13, HIGH);\n  }\n}\n"
    ));
}

#[test]
fn six_block_workspace_survives_reload() {
    init_tracing();
    let registry = Arc::new(BlockRegistry::builtin());
    let mut ws = Workspace::new(registry.clone(), "nano").unwrap();
    let setup = ws.root(RootKind::Setup).unwrap();
    let lp = ws.root(RootKind::Loop).unwrap();

    let begin = ws.create_block("serial_begin").unwrap();
    ws.connect_statement(setup, StatementTarget::slot("DO"), begin).unwrap();

    let check = ws.create_block("if_then").unwrap();
    let compare = ws.create_block("compare").unwrap();
    let threshold = ws.create_block("number").unwrap();
    ws.set_field(threshold, "NUM", 512u64).unwrap();
    ws.connect_value(compare, "A", threshold).unwrap();
    ws.connect_value(check, "CONDITION", compare).unwrap();
    ws.connect_statement(lp, StatementTarget::slot("DO"), check).unwrap();
    assert_eq!(ws.len(), 6);

    let json = serializer::save(&ws).to_json().unwrap();
    let reloaded = serializer::load(registry, &json);

    assert_eq!(reloaded.len(), 6);
    assert_eq!(serializer::save(&reloaded), serializer::save(&ws));
    assert_eq!(compile_workspace(&reloaded).unwrap(), compile_workspace(&ws).unwrap());
}

#[test]
fn corrupt_snapshot_loads_as_empty_program_with_protected_roots() {
    init_tracing();
    let registry = Arc::new(BlockRegistry::builtin());
    for input in ["", "null", "{\"stacks\": [{\"blocks\": [{\"type\": \"root_loop\"}, 7]}]}"] {
        let mut ws = serializer::load(registry.clone(), input);
        assert_eq!(ws.len(), 2, "input {:?}", input);
        for kind in RootKind::ALL {
            let root = ws.root(kind).unwrap();
            assert!(matches!(ws.delete_block(root), Err(GraphError::ProtectedBlock(_))));
        }
    }
}

#[test]
fn board_switch_keeps_values_and_changes_options() {
    init_tracing();
    let mut ws = workspace("uno");
    let write = ws.create_block("digital_write").unwrap();
    ws.set_field(write, "PIN", "13").unwrap();

    let stale = ws.set_board("esp32").unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].block, write);
    assert_eq!(ws.block(write).unwrap().fields["PIN"].to_string(), "13");

    let options: Vec<String> = ws
        .available_options(write, "PIN")
        .unwrap()
        .into_iter()
        .map(|o| o.value)
        .collect();
    assert_eq!(options.first().map(String::as_str), Some("2"));
    assert!(options.contains(&"23".to_string()));
    assert!(!options.contains(&"13".to_string()));
}

/// Bridge that yields during upload so concurrent callers overlap.
#[derive(Default)]
struct CountingBridge {
    calls: Mutex<Vec<&'static str>>,
    serial: Mutex<Option<mpsc::Sender<String>>>,
}

#[async_trait]
impl DeviceBridge for CountingBridge {
    async fn list_ports(&self) -> Result<Vec<PortId>, DeviceError> {
        Ok(vec![PortId::new("COM3")])
    }

    async fn start_serial(&self, _port: &PortId) -> Result<SerialLines, DeviceError> {
        self.calls.lock().push("start_serial");
        let (tx, rx) = mpsc::channel(64);
        *self.serial.lock() = Some(tx);
        Ok(rx)
    }

    async fn stop_serial(&self) -> Result<(), DeviceError> {
        self.calls.lock().push("stop_serial");
        self.serial.lock().take();
        Ok(())
    }

    async fn upload_code(
        &self,
        _source: &str,
        _board: &BoardDescriptor,
        _port: &PortId,
    ) -> Result<(), DeviceError> {
        self.calls.lock().push("upload");
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn back_to_back_uploads_reach_the_bridge_once() {
    init_tracing();
    let session = DeviceSession::new(CountingBridge::default(), BoardRegistry::builtin());
    let port = PortId::new("COM3");
    let code = compile_workspace(&workspace("nano")).unwrap();

    let (first, second) = tokio::join!(
        session.start_upload(&code, "nano", &port),
        session.start_upload(&code, "nano", &port),
    );

    assert_eq!(first, Ok(UploadOutcome::Uploaded));
    assert_eq!(second, Ok(UploadOutcome::AlreadyUploading));
    assert_eq!(*session.bridge().calls.lock(), vec!["upload"]);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn monitor_keeps_last_twenty_lines_and_yields_port_to_upload() {
    init_tracing();
    let session = DeviceSession::new(CountingBridge::default(), BoardRegistry::builtin());
    let port = PortId::new("COM3");
    session.start_monitor(&port).await.unwrap();

    let tx = session.bridge().serial.lock().clone().unwrap();
    let mut live = session.feed().subscribe();
    for i in 1..=25 {
        tx.send(format!("reading {}", i)).await.unwrap();
    }
    for _ in 0..25 {
        live.recv().await.unwrap();
    }

    let (replay, _rx) = session.feed().attach();
    let expected: Vec<String> = (6..=25).map(|i| format!("reading {}", i)).collect();
    assert_eq!(replay, expected);

    let outcome = session.start_upload("void setup() {}", "uno", &port).await;
    assert_eq!(outcome, Ok(UploadOutcome::Uploaded));
    assert_eq!(
        *session.bridge().calls.lock(),
        vec!["start_serial", "stop_serial", "upload"]
    );
    assert!(tx.send("after upload".to_string()).await.is_err());
    assert_eq!(session.state(), SessionState::Idle);
}
