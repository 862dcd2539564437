//! 脚本桥集成测试：用一个会「异步应答」的宿主跑通 defer / get

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use serde_json::{json, Value};
use webview_bridge::config::BridgeSection;
use webview_bridge::core::{
    AppLifecycle, BridgeError, CallbackNames, IdStrategy, ResponseRouter, ScriptBridge,
};
use webview_bridge::host::{Dispatch, ScriptHost};

/// 表达式 → (延迟, 结果)
type Answers = HashMap<String, (Duration, Result<Value, String>)>;

/// 按表达式查表、延迟后经回调应答的宿主；查不到的表达式永不应答
struct RespondingHost {
    answers: Answers,
    router: Mutex<Option<Arc<ResponseRouter>>>,
    code_re: Regex,
}

impl RespondingHost {
    fn new(answers: Answers) -> Self {
        Self {
            answers,
            router: Mutex::new(None),
            code_re: Regex::new(r#"var code = ("(?:[^"\\]|\\.)*");"#).unwrap(),
        }
    }

    fn router(&self) -> Arc<ResponseRouter> {
        self.router.lock().unwrap().clone().expect("host not bound")
    }

    /// 从脚本中还原嵌入的表达式
    fn embedded_code(&self, script: &str) -> Option<String> {
        let literal = self.code_re.captures(script)?.get(1)?.as_str();
        serde_json::from_str(literal).ok()
    }
}

impl ScriptHost for RespondingHost {
    fn bind(&self, _callbacks: &CallbackNames, router: Arc<ResponseRouter>) -> Result<(), String> {
        let mut bound = self.router.lock().unwrap();
        if bound.is_some() {
            return Err("host already bound".to_string());
        }
        *bound = Some(router);
        Ok(())
    }

    fn evaluate(&self, dispatch: Dispatch) -> Result<(), String> {
        let code = self
            .embedded_code(dispatch.script())
            .ok_or_else(|| "no code in script".to_string())?;

        if let Some((delay, result)) = self.answers.get(&code).cloned() {
            let router = self.router();
            let id = dispatch.id().to_string();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                match result {
                    Ok(value) => router.on_success(&id, value),
                    Err(message) => router.on_failure(&id, &message),
                };
            });
        }
        Ok(())
    }
}

fn answers() -> Answers {
    let mut answers = Answers::new();
    answers.insert("1+1".to_string(), (Duration::from_millis(5), Ok(json!(2))));
    answers.insert(
        "slowValue()".to_string(),
        (Duration::from_millis(60), Ok(json!("slow"))),
    );
    answers.insert(
        "fastValue()".to_string(),
        (Duration::from_millis(5), Ok(json!("fast"))),
    );
    answers.insert(
        "throwError()".to_string(),
        (Duration::from_millis(5), Err("Oops".to_string())),
    );
    answers.insert(
        "document.title;".to_string(),
        (Duration::from_millis(5), Ok(json!("Title"))),
    );
    answers.insert(
        "lateValue()".to_string(),
        (Duration::from_millis(80), Ok(json!("too late"))),
    );
    answers
}

fn setup(section: &BridgeSection) -> (Arc<RespondingHost>, ScriptBridge) {
    let host = Arc::new(RespondingHost::new(answers()));
    let bridge = ScriptBridge::new(section, host.clone(), AppLifecycle::new()).unwrap();
    (host, bridge)
}

#[tokio::test]
async fn test_defer_round_trip() {
    let (_, bridge) = setup(&BridgeSection::default());
    let pending = bridge.defer("1+1");
    assert_eq!(pending.id().map(|id| id.as_str()), Some("1"));
    assert_eq!(pending.await, Ok(json!(2)));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_out_of_order_results() {
    let (_, bridge) = setup(&BridgeSection::default());
    let slow = bridge.defer("slowValue()");
    let fast = bridge.defer("fastValue()");

    let (slow, fast) = tokio::join!(slow, fast);
    assert_eq!(slow, Ok(json!("slow")));
    assert_eq!(fast, Ok(json!("fast")));
    assert_eq!(bridge.metrics().resolved, 2);
}

#[tokio::test]
async fn test_get_client_error() {
    let (_, bridge) = setup(&BridgeSection::default());
    let err = bridge
        .get("throwError()", Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("Oops"));
}

#[tokio::test]
async fn test_get_stalls_on_silent_host() {
    let (_, bridge) = setup(&BridgeSection::default());
    let err = bridge
        .get("document.title", Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BridgeError::StalledRequest {
            code: "document.title".to_string(),
            timeout: Duration::from_millis(50),
        }
    );
}

#[tokio::test]
async fn test_late_answer_after_timeout_is_dropped() {
    let (_, bridge) = setup(&BridgeSection::default());
    let err = bridge
        .get("lateValue()", Some(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::StalledRequest { .. }));

    // 等宿主的迟到应答落地
    tokio::time::sleep(Duration::from_millis(120)).await;
    let metrics = bridge.metrics();
    assert_eq!(metrics.stalled, 1);
    assert_eq!(metrics.resolved, 0);
    assert_eq!(metrics.late_arrivals, 1);
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_uuid_ids_with_custom_callbacks() {
    let section = BridgeSection {
        id_strategy: IdStrategy::Uuid,
        success_callback: Some("host.ok".to_string()),
        failure_callback: Some("host.fail".to_string()),
        ..BridgeSection::default()
    };
    let (_, bridge) = setup(&section);
    assert_eq!(bridge.callbacks().success, "host.ok");

    let pending = bridge.defer("1+1");
    assert_eq!(pending.id().map(|id| id.as_str().len()), Some(36));
    assert_eq!(pending.await, Ok(json!(2)));
}

#[tokio::test]
async fn test_external_timeout_on_defer_cancels_entry() {
    let (_, bridge) = setup(&BridgeSection::default());
    let result = tokio::time::timeout(Duration::from_millis(10), bridge.defer("lateValue()")).await;
    assert!(result.is_err());
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(bridge.metrics().cancelled, 1);
}

#[tokio::test]
async fn test_statement_code_reaches_host_intact() {
    let (_, bridge) = setup(&BridgeSection::default());
    let value = bridge
        .get("document.title;", Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(value, json!("Title"));
}

#[tokio::test]
async fn test_second_bridge_on_bound_host_fails() {
    let (host, _bridge) = setup(&BridgeSection::default());
    let other = BridgeSection {
        namespace: "other".to_string(),
        ..BridgeSection::default()
    };
    let result = ScriptBridge::new(&other, host, AppLifecycle::new());
    assert!(matches!(result, Err(BridgeError::HostError(_))));
}
