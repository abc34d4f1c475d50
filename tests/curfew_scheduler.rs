mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Timelike, Utc};
use common::{Call, RecordingPlatform, TokioClock};
use tigris_groupguard::config::{CurfewGroupOverride, Settings};
use tigris_groupguard::curfew::{CurfewManager, CurfewPlan, CurfewTask, CurfewWindow};

const GROUP: i64 = 4242;

fn plan(window: CurfewWindow) -> CurfewPlan {
    CurfewPlan {
        group_id: GROUP,
        window,
        offset: FixedOffset::east_opt(0).unwrap(),
        backoff: Duration::from_secs(60),
        start_text: "curfew on".into(),
        end_text: "curfew off".into(),
    }
}

/// Okno obejmujące całą dobę – grupa zawsze powinna być wyciszona.
fn always() -> CurfewWindow {
    CurfewWindow::new("00:00", 24).unwrap()
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
}

fn spawn_at(window: CurfewWindow, platform: &Arc<RecordingPlatform>, start: DateTime<Utc>) -> CurfewTask {
    CurfewTask::spawn_with_clock(plan(window), platform.clone(), Arc::new(TokioClock::starting_at(start)))
}

fn texts(platform: &RecordingPlatform) -> Vec<String> {
    platform.sent().into_iter().map(|(_, t)| t).collect()
}

/// Okno, które zaczyna się za dwie godziny (UTC).
fn later() -> CurfewWindow {
    let (start, _) = Utc::now().time().overflowing_add_signed(chrono::Duration::hours(2));
    CurfewWindow::new(&format!("{:02}:{:02}", start.hour(), start.minute()), 1).unwrap()
}

#[tokio::test]
async fn enters_curfew_and_unmutes_on_stop() {
    let platform = Arc::new(RecordingPlatform::default());
    let task = CurfewTask::spawn(plan(always()), platform.clone());
    assert_eq!(task.group_id(), GROUP);

    let mut rx = task.subscribe();
    rx.wait_for(|s| s.muted).await.unwrap();

    let sent = platform.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "curfew on");
    assert_eq!(platform.whole_bans(), vec![true]);

    task.stop().await;
    assert_eq!(platform.whole_bans(), vec![true, false]);
    let last = *rx.borrow();
    assert!(!last.running);
    assert!(!last.muted);
    // przy zatrzymaniu nie ma ogłoszenia końca
    assert_eq!(platform.sent().len(), 1);
}

#[tokio::test]
async fn stop_completes_even_if_unmute_fails() {
    let platform = Arc::new(RecordingPlatform::default());
    let task = CurfewTask::spawn(plan(always()), platform.clone());
    task.subscribe().wait_for(|s| s.muted).await.unwrap();

    platform.fail("set_group_whole_ban");
    let state = task.subscribe();
    tokio::time::timeout(Duration::from_secs(5), task.stop())
        .await
        .expect("stop must not hang");

    assert_eq!(platform.whole_bans(), vec![true]);
    let last = *state.borrow();
    assert!(!last.running);
    assert!(last.muted);
}

#[tokio::test]
async fn failed_announcement_does_not_block_mute() {
    let platform = Arc::new(RecordingPlatform::default());
    platform.fail("send_group_msg");
    let task = CurfewTask::spawn(plan(always()), platform.clone());

    task.subscribe().wait_for(|s| s.muted).await.unwrap();
    assert!(platform.sent().is_empty());
    assert_eq!(platform.whole_bans(), vec![true]);
    task.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_mute_is_logged_and_never_reannounced() {
    let platform = Arc::new(RecordingPlatform::default());
    platform.fail("set_group_whole_ban");
    let task = spawn_at(always(), &platform, at(0, 30));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(!task.state().muted);
    assert_eq!(texts(&platform), vec!["curfew on"]);

    platform.heal("set_group_whole_ban");
    tokio::time::sleep(Duration::from_secs(2900)).await;
    assert!(!task.state().muted, "next attempt only at the hourly check");

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(task.state().muted);
    assert_eq!(texts(&platform), vec!["curfew on"]);
    assert_eq!(platform.whole_bans(), vec![true]);
    task.stop().await;
}

#[tokio::test(start_paused = true)]
async fn missed_night_is_announced_again_next_night() {
    let platform = Arc::new(RecordingPlatform::default());
    platform.fail("set_group_whole_ban");
    let task = spawn_at(CurfewWindow::new("00:00", 1).unwrap(), &platform, at(0, 30));

    tokio::time::sleep(Duration::from_secs(1000)).await;
    platform.heal("set_group_whole_ban");

    // 00:30 → następna północ to 23,5 h
    tokio::time::sleep(Duration::from_secs(84_600 + 60)).await;
    assert!(task.state().muted);
    assert_eq!(texts(&platform), vec!["curfew on", "curfew on"]);
    assert_eq!(platform.whole_bans(), vec![true]);
    task.stop().await;
}

#[tokio::test(start_paused = true)]
async fn leaving_curfew_announces_then_unmutes() {
    let platform = Arc::new(RecordingPlatform::default());
    let task = spawn_at(CurfewWindow::new("00:00", 1).unwrap(), &platform, at(0, 59));
    task.subscribe().wait_for(|s| s.muted).await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    let state = task.state();
    assert!(state.running);
    assert!(!state.muted);
    assert_eq!(texts(&platform), vec!["curfew on", "curfew off"]);
    assert_eq!(platform.whole_bans(), vec![true, false]);

    let calls = platform.calls();
    let off = calls
        .iter()
        .position(|c| matches!(c, Call::Send { text, .. } if text == "curfew off"))
        .unwrap();
    let unmute = calls
        .iter()
        .position(|c| matches!(c, Call::WholeBan { enable: false, .. }))
        .unwrap();
    assert!(off < unmute);

    task.stop().await;
    // już odciszona, stop niczego nie wysyła
    assert_eq!(platform.whole_bans(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn failed_end_announcement_still_unmutes() {
    let platform = Arc::new(RecordingPlatform::default());
    let task = spawn_at(CurfewWindow::new("00:00", 1).unwrap(), &platform, at(0, 59));
    task.subscribe().wait_for(|s| s.muted).await.unwrap();

    platform.fail("send_group_msg");
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(!task.state().muted);
    assert_eq!(texts(&platform), vec!["curfew on"]);
    assert_eq!(platform.whole_bans(), vec![true, false]);
    task.stop().await;
}

#[tokio::test(start_paused = true)]
async fn panicking_iteration_backs_off_and_recovers() {
    let platform = Arc::new(RecordingPlatform::default());
    platform.panic_once("set_group_whole_ban");
    let task = spawn_at(always(), &platform, at(0, 30));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(task.state().running);
    assert!(!task.state().muted);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(task.state().muted);
    assert_eq!(texts(&platform), vec!["curfew on"]);

    task.stop().await;
    assert_eq!(platform.whole_bans(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn outside_window_nothing_happens() {
    let platform = Arc::new(RecordingPlatform::default());
    let task = CurfewTask::spawn(plan(later()), platform.clone());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(task.state().running);
    assert!(!task.state().muted);
    task.stop().await;
    assert!(platform.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn offline_platform_skips_cycles() {
    let platform = Arc::new(RecordingPlatform::default());
    platform.set_offline(true);
    let task = CurfewTask::spawn(plan(always()), platform.clone());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(platform.calls().is_empty());

    platform.set_offline(false);
    task.subscribe().wait_for(|s| s.muted).await.unwrap();
    task.stop().await;
    assert_eq!(platform.whole_bans(), vec![true, false]);
}

#[tokio::test]
async fn manager_starts_valid_groups_only() {
    let platform = Arc::new(RecordingPlatform::default());
    let manager = CurfewManager::new(platform.clone());

    let mut cfg = Settings::default().curfew;
    cfg.start = "00:00".into();
    cfg.duration_hours = 24;
    cfg.groups.insert(
        "2".into(),
        CurfewGroupOverride {
            start: Some("99:99".into()),
            ..Default::default()
        },
    );
    cfg.groups.insert(
        "3".into(),
        CurfewGroupOverride {
            enabled: Some(false),
            ..Default::default()
        },
    );

    let started = manager.start_all(&cfg, [1, 2, 3, 4]).await;
    assert_eq!(started, 2);
    assert_eq!(manager.running().await, 2);
    assert!(manager.state(2).await.is_none());

    // drugi start tej samej grupy jest ignorowany
    assert_eq!(manager.start_all(&cfg, [1]).await, 0);

    manager.stop_all().await;
    assert_eq!(manager.running().await, 0);
}
