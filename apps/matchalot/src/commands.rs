use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use directories::ProjectDirs;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use matchalot_sync::matching::{MatchAction, MatchRequest};
use matchalot_sync::{
    ApiClient, ConnectionProjector, ConnectionView, FileShownIdStore, MatchChannel, MatchCommand,
    MatchEvent, Notification, NotificationChannel, ToastPresenter,
};

use crate::cli::{Delivery, MatchCommand as MatchArgs, NotificationsCommand, WatchArgs};

// Time left for the socket writer to flush a fire-and-forget command.
const SEND_LINGER: Duration = Duration::from_millis(300);

pub async fn whoami(api: &ApiClient) -> anyhow::Result<()> {
    let user = api.current_user().await.context("failed to load current user")?;
    println!("{} <{}>", user.nickname, user.email);
    println!("  id:          {}", user.id);
    println!("  trust score: {}", user.trust_score);
    if let Some(role) = &user.role {
        println!("  role:        {role}");
    }
    Ok(())
}

pub async fn logout(api: &ApiClient) -> anyhow::Result<()> {
    api.logout().await.context("logout failed")?;
    println!("signed out");
    Ok(())
}

pub async fn notifications(api: ApiClient, command: NotificationsCommand) -> anyhow::Result<()> {
    let channel = NotificationChannel::new(api)?;
    match command {
        NotificationsCommand::List { unread } => {
            channel.fetch_all(unread).await?;
            let state = channel.state();
            if state.notifications.is_empty() {
                println!("no notifications");
            }
            for notification in &state.notifications {
                print_notification(notification);
            }
            println!("{} unread", state.unread_count);
        }
        NotificationsCommand::Count => {
            println!("{}", channel.fetch_unread_count().await?);
        }
        NotificationsCommand::Read { id } => {
            channel.mark_as_read(id).await?;
            println!("notification {id} marked as read");
        }
        NotificationsCommand::ReadAll => {
            channel.mark_all_as_read().await?;
            println!("all notifications marked as read");
        }
        NotificationsCommand::Delete { id } => {
            channel.delete(id).await?;
            println!("notification {id} deleted");
        }
    }
    Ok(())
}

pub async fn matches(api: ApiClient, args: MatchArgs) -> anyhow::Result<()> {
    let (command, delivery) = match args {
        MatchArgs::Request {
            material_id,
            receiver_id,
            requester_material_id,
            delivery,
        } => (
            MatchCommand::MatchRequest(MatchRequest {
                material_id,
                receiver_id,
                requester_material_id,
            }),
            delivery,
        ),
        MatchArgs::Accept { match_id, delivery } => {
            (MatchCommand::respond(match_id, MatchAction::Accept), delivery)
        }
        MatchArgs::Reject { match_id, delivery } => {
            (MatchCommand::respond(match_id, MatchAction::Reject), delivery)
        }
        MatchArgs::Complete { match_id, delivery } => {
            (MatchCommand::respond(match_id, MatchAction::Complete), delivery)
        }
    };

    if delivery.rest {
        let body = match command {
            MatchCommand::MatchRequest(request) => api.request_match(&request).await?,
            MatchCommand::MatchResponse(response) => {
                api.respond_to_match(response.match_id, response.action).await?
            }
        };
        print_value(&body)?;
        return Ok(());
    }
    send_over_socket(api, command, delivery).await
}

async fn send_over_socket(
    api: ApiClient,
    command: MatchCommand,
    delivery: Delivery,
) -> anyhow::Result<()> {
    let channel = MatchChannel::new(api);
    channel.connect().await?;

    let mut state = channel.subscribe();
    let connected = timeout(Duration::from_millis(delivery.wait_ms), async {
        loop {
            if state.borrow_and_update().status.is_connected() {
                return true;
            }
            if state.changed().await.is_err() {
                return false;
            }
        }
    })
    .await
    .unwrap_or(false);
    if !connected {
        channel.teardown();
        bail!("could not reach the match server within {}ms", delivery.wait_ms);
    }

    let sent = channel.send(&command);
    if sent.is_ok() {
        sleep(SEND_LINGER).await;
    }
    let events = channel.state().events;
    channel.teardown();
    sent?;

    println!("sent");
    for event in &events {
        print_match_event(event);
    }
    Ok(())
}

pub async fn watch(api: ApiClient, args: WatchArgs) -> anyhow::Result<()> {
    let store_path = match args.shown_ids {
        Some(path) => path,
        None => default_shown_ids_path()?,
    };
    let mut toasts = ToastPresenter::new(FileShownIdStore::new(&store_path))
        .with_context(|| format!("cannot read {}", store_path.display()))?;

    let notifications = NotificationChannel::new(api.clone())?;
    let matching = MatchChannel::new(api);

    if let Err(err) = notifications.fetch_all(false).await {
        warn!(error = %err, "initial notification load failed");
    }
    notifications.connect();
    if !args.no_match {
        if let Err(err) = matching.connect().await {
            eprintln!("match socket unavailable: {err}");
        }
    }

    let mut projector = ConnectionProjector::new(&notifications, &matching);
    let mut printer = WatchPrinter::default();
    printer.render(&projector.snapshot(), &mut toasts);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted; closing channels");
                break;
            }
            alive = projector.changed() => {
                if !alive {
                    break;
                }
                printer.render(&projector.snapshot(), &mut toasts);
            }
        }
    }

    notifications.teardown();
    matching.teardown();
    Ok(())
}

#[derive(Default)]
struct WatchPrinter {
    connected: Option<(bool, bool)>,
    unread: Option<u64>,
    events_seen: usize,
    last_error: Option<String>,
}

impl WatchPrinter {
    fn render(&mut self, view: &ConnectionView, toasts: &mut ToastPresenter<FileShownIdStore>) {
        let connected = (view.notifications_connected, view.match_connected);
        if self.connected != Some(connected) {
            println!(
                "notifications: {}  match: {}",
                online(connected.0),
                online(connected.1)
            );
            self.connected = Some(connected);
        }
        if self.unread != Some(view.unread_count) {
            println!("unread: {}", view.unread_count);
            self.unread = Some(view.unread_count);
        }
        if let Some(toast) = toasts.observe(&view.notifications) {
            print!("new ");
            print_notification(&toast);
        }
        if view.match_events.len() < self.events_seen {
            self.events_seen = 0;
        }
        for event in &view.match_events[self.events_seen..] {
            print_match_event(event);
        }
        self.events_seen = view.match_events.len();
        if view.error != self.last_error {
            if let Some(error) = &view.error {
                eprintln!("! {error}");
            }
            self.last_error = view.error.clone();
        }
    }
}

fn online(connected: bool) -> &'static str {
    if connected {
        "online"
    } else {
        "offline"
    }
}

fn default_shown_ids_path() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from("store", "match-a-lot", "matchalot")
        .ok_or_else(|| anyhow!("cannot determine a data directory; pass --shown-ids"))?;
    Ok(dirs.data_dir().join("shown-notifications.json"))
}

fn print_notification(notification: &Notification) {
    let marker = if notification.is_read { ' ' } else { '*' };
    println!(
        "{marker} #{} [{:?}] {}: {} ({})",
        notification.id,
        notification.kind,
        notification.title,
        notification.message,
        notification.created_at
    );
}

fn print_match_event(event: &MatchEvent) {
    let label = if event.is_error() { "match error" } else { "match" };
    if event.data.is_null() {
        println!("{label}: {}", event.kind);
    } else {
        println!("{label}: {} {}", event.kind, event.data);
    }
}

fn print_value(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
