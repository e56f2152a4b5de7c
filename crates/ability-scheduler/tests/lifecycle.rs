//! 能力生命周期端到端验证
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：通过真实的任务循环、tokio 定时器与进程管理器替身，验证启动、回连、前台回报、
//!   跃迁完成、超时与死亡恢复在命令串行化之后的整体行为；
//! - **设计手法 (How)**：使用 `start_paused` 虚拟时间，超时可以被精确推进而无需真实等待；
//!   每次断言前通过 `snapshot` 命令与管理器任务同步，命令通道的 FIFO 顺序保证此前投递的事件已被处理。

use std::{sync::Arc, time::Duration};

use ability_core::{
    AbilityRequest, AbilitySchedulerHandle, AbilityState, AbilityToken, AppAbilityState,
    MockAbilityThread, ProcessAbilityState, SchedulerConfig, StartOutcome,
    testing::{AppMgrCall, FakeAppMgrClient},
    well_known::{SYSTEM_UI_BUNDLE_NAME, SYSTEM_UI_NAVIGATION_BAR, SYSTEM_UI_STATUS_BAR},
};
use ability_scheduler::{AbilityRuntime, ManagerSnapshot, SchedulerContext, StackKind};

const ACTIVE: i32 = 2;

fn status_bar() -> AbilityRequest {
    AbilityRequest::new(SYSTEM_UI_BUNDLE_NAME, SYSTEM_UI_STATUS_BAR).with_app_name("SystemUI")
}

fn navigation_bar() -> AbilityRequest {
    AbilityRequest::new(SYSTEM_UI_BUNDLE_NAME, SYSTEM_UI_NAVIGATION_BAR).with_app_name("SystemUI")
}

fn launch(client: &Arc<FakeAppMgrClient>) -> (Arc<SchedulerContext>, AbilityRuntime) {
    launch_with(client, SchedulerConfig::default())
}

fn launch_with(
    client: &Arc<FakeAppMgrClient>,
    config: SchedulerConfig,
) -> (Arc<SchedulerContext>, AbilityRuntime) {
    let context = SchedulerContext::new(Some(client.clone()), config).expect("配置应通过校验");
    let runtime = context
        .launch(0, StackKind::KernelSystem)
        .expect("运行时应启动成功");
    (context, runtime)
}

async fn snapshot(runtime: &AbilityRuntime) -> ManagerSnapshot {
    runtime.handle().snapshot().await.expect("管理器应在运行")
}

async fn only_token(runtime: &AbilityRuntime) -> AbilityToken {
    snapshot(runtime).await.abilities[0].token
}

#[tokio::test(start_paused = true)]
async fn attach_foreground_and_transition_done_reach_active() {
    let client = FakeAppMgrClient::echoing();
    let (context, runtime) = launch(&client);
    let handle = runtime.handle().clone();

    let outcome = handle.start_ability(status_bar()).await.expect("启动应成功");
    assert_eq!(outcome, StartOutcome::Started);
    let token = only_token(&runtime).await;

    let thread = MockAbilityThread::new();
    handle
        .attach_ability_thread(Some(AbilitySchedulerHandle::Mock(thread.clone())), Some(token))
        .await
        .expect("回连应成功");

    let snap = snapshot(&runtime).await;
    assert_eq!(snap.abilities[0].state, AbilityState::Activating);
    assert!(snap.abilities[0].is_ready);
    assert_eq!(thread.transaction_count(), 1);
    assert_eq!(context.app_scheduler().get_ability_state(), AppAbilityState::Foreground);

    handle
        .ability_transition_done(Some(token), ACTIVE)
        .await
        .expect("跃迁应成功");
    let snap = snapshot(&runtime).await;
    assert_eq!(snap.abilities[0].state, AbilityState::Active);
    assert_eq!(snap.abilities[0].event_id, None);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(snapshot(&runtime).await.abilities.len(), 1);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn load_timeout_removes_record_and_drains_queue() {
    let client = FakeAppMgrClient::new();
    let (_context, runtime) = launch(&client);
    let handle = runtime.handle().clone();

    handle.start_ability(status_bar()).await.expect("启动应成功");
    let first = only_token(&runtime).await;
    let outcome = handle.start_ability(navigation_bar()).await.expect("排队应成功");
    assert_eq!(outcome, StartOutcome::Waiting);

    tokio::time::sleep(Duration::from_millis(4_999)).await;
    let snap = snapshot(&runtime).await;
    assert_eq!(snap.abilities.len(), 1);
    assert_eq!(snap.waiting, 1);

    tokio::time::sleep(Duration::from_millis(2)).await;
    let snap = snapshot(&runtime).await;
    assert_eq!(snap.waiting, 0);
    assert_eq!(snap.abilities.len(), 1);
    assert_ne!(snap.abilities[0].token, first);
    assert_eq!(snap.abilities[0].ability_name, SYSTEM_UI_NAVIGATION_BAR);
    assert_eq!(snap.top, Some(snap.abilities[0].token));
    assert!(client.calls().contains(&AppMgrCall::KillProcess(first)));

    let lines = handle.dump_state().await.expect("管理器应在运行");
    assert!(!lines.iter().any(|line| line.contains(SYSTEM_UI_STATUS_BAR)));

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn death_disarms_timeout_and_foreground_report_reactivates() {
    let client = FakeAppMgrClient::new();
    let (_context, runtime) = launch(&client);
    let handle = runtime.handle().clone();

    handle.start_ability(status_bar()).await.expect("启动应成功");
    let token = only_token(&runtime).await;
    handle.notify_ability_died(token);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let snap = snapshot(&runtime).await;
    assert_eq!(snap.abilities.len(), 1);
    assert_eq!(snap.abilities[0].state, AbilityState::Initial);
    assert_eq!(snap.abilities[0].event_id, None);

    client.report(token, ProcessAbilityState::Background);
    assert_eq!(snapshot(&runtime).await.abilities[0].state, AbilityState::Initial);

    client.report(token, ProcessAbilityState::Foreground);
    let snap = snapshot(&runtime).await;
    assert_eq!(snap.abilities[0].state, AbilityState::Activating);
    assert!(snap.abilities[0].event_id.is_some());

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn death_while_activating_hands_over_to_waiting_request() {
    let client = FakeAppMgrClient::new();
    let config = SchedulerConfig {
        system_ui_timeout_ms: 120_000,
        ..SchedulerConfig::default()
    };
    let (_context, runtime) = launch_with(&client, config);
    let handle = runtime.handle().clone();

    handle.start_ability(status_bar()).await.expect("启动应成功");
    let dead = only_token(&runtime).await;
    let outcome = handle.start_ability(navigation_bar()).await.expect("排队应成功");
    assert_eq!(outcome, StartOutcome::Waiting);

    handle.notify_ability_died(dead);
    tokio::time::sleep(Duration::from_secs(60)).await;
    let snap = snapshot(&runtime).await;
    assert_eq!(snap.waiting, 0);
    let nav = snap
        .abilities
        .iter()
        .find(|ability| ability.ability_name == SYSTEM_UI_NAVIGATION_BAR)
        .expect("导航栏应在死亡后被拉起");
    assert_eq!(nav.state, AbilityState::Activating);
    assert_eq!(snap.top, Some(nav.token));
    assert_eq!(client.load_count(), 2);

    let outcome = handle
        .start_ability(AbilityRequest::new("com.ix.late", "MainAbility"))
        .await
        .expect("排队应成功");
    assert_eq!(outcome, StartOutcome::Waiting);
    assert_eq!(snapshot(&runtime).await.waiting, 1);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transition_done_rejects_invalid_targets() {
    let client = FakeAppMgrClient::new();
    let (_context, runtime) = launch(&client);
    let handle = runtime.handle().clone();

    let err = handle.ability_transition_done(None, ACTIVE).await.unwrap_err();
    assert!(err.is_invalid_value());

    handle.start_ability(status_bar()).await.expect("启动应成功");
    let token = only_token(&runtime).await;
    let err = handle.ability_transition_done(Some(token), -1).await.unwrap_err();
    assert!(err.is_invalid_value());
    handle
        .ability_transition_done(Some(token), ACTIVE)
        .await
        .expect("跃迁应成功");
    let err = handle
        .ability_transition_done(Some(token), ACTIVE)
        .await
        .unwrap_err();
    assert!(err.is_invalid_value());

    runtime.shutdown().await;
}

#[tokio::test]
async fn blocking_start_from_plain_thread() {
    let client = FakeAppMgrClient::new();
    let (_context, runtime) = launch(&client);
    let handle = runtime.handle().clone();

    let outcome = tokio::task::spawn_blocking(move || handle.start_ability_blocking(status_bar()))
        .await
        .expect("阻塞任务不应 panic")
        .expect("启动应成功");
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(client.load_count(), 1);

    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_handle_and_unregisters_observer() {
    let client = FakeAppMgrClient::new();
    let (context, runtime) = launch(&client);
    let handle = runtime.handle().clone();
    assert!(runtime.is_observing());

    runtime.shutdown().await;
    let err = handle.start_ability(status_bar()).await.unwrap_err();
    assert_eq!(err, ability_core::AbilityError::ManagerClosed);
    assert!(handle.is_closed());

    context
        .app_scheduler()
        .on_ability_request_done(AbilityToken::allocate(), ProcessAbilityState::Foreground.as_raw());
    assert_eq!(context.app_scheduler().get_ability_state(), AppAbilityState::Foreground);
}

#[tokio::test]
async fn launch_fails_when_gateway_cannot_connect() {
    let client = FakeAppMgrClient::new();
    client.fail_connect(ability_core::AppMgrResultCode::ErrorServiceNotReady);
    let context = SchedulerContext::new(Some(client), SchedulerConfig::default())
        .expect("默认配置应通过校验");
    let err = context.launch(0, StackKind::KernelSystem).unwrap_err();
    assert_eq!(err.error_code(), ability_core::ErrorCode::InnerError);
}

#[test]
fn invalid_config_is_rejected_before_launch() {
    let config = SchedulerConfig {
        load_timeout_ms: 0,
        ..SchedulerConfig::default()
    };
    assert!(SchedulerContext::new(None, config).is_err());
}
