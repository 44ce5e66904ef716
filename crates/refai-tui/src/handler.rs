use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::app::{App, AuthMode, Screen};
use crate::tui::{AppEvent, BackendEvent, TurnEvent};
use refai_core::{BackendError, Notification};

type Sender = UnboundedSender<AppEvent>;

pub fn handle_event(app: &mut App, event: AppEvent, tx: &Sender) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key, tx),
        AppEvent::Resize(_, _) => {
            if app.follow_output {
                app.scroll_chat_to_bottom();
            }
        }
        AppEvent::Tick => {
            let now = Instant::now();
            app.on_tick(now);
            if app.subscription_check_due(now) {
                check_subscription(app, tx);
            }
        }
        AppEvent::Turn(event) => handle_turn(app, event),
        AppEvent::Backend(event) => handle_backend(app, event, tx),
    }
    Ok(())
}

fn ctrl(key: &KeyEvent, c: char) -> bool {
    key.code == KeyCode::Char(c) && key.modifiers.contains(KeyModifiers::CONTROL)
}

fn handle_key(app: &mut App, key: KeyEvent, tx: &Sender) {
    // Global keys that work on every screen
    if ctrl(&key, 'c') {
        app.should_quit = true;
        return;
    }
    if ctrl(&key, 'o') && app.session.is_some() {
        sign_out(app);
        return;
    }

    match app.screen() {
        Screen::SignIn => handle_sign_in_key(app, key, tx),
        Screen::Checking => {}
        Screen::Paywall => handle_paywall_key(app, key, tx),
        Screen::Subscription => handle_subscription_key(app, key, tx),
        Screen::Chat if app.show_sources => handle_sources_key(app, key),
        Screen::Chat => handle_chat_key(app, key, tx),
    }
}

fn handle_chat_key(app: &mut App, key: KeyEvent, tx: &Sender) {
    if ctrl(&key, 'n') {
        if app.chat.new_chat() {
            app.attachments.clear();
            app.scroll_chat_to_bottom();
        }
        return;
    }
    if ctrl(&key, 's') {
        app.show_sources = true;
        return;
    }
    if ctrl(&key, 'b') {
        if app.session.is_some() {
            app.show_subscription = true;
        }
        return;
    }

    match key.code {
        KeyCode::Enter => submit(app, tx),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(2) / 2),
        KeyCode::PageDown => app.scroll_down(app.chat_height.max(2) / 2),
        // Input is locked while a reply streams in
        _ if app.chat.is_loading() => {}
        KeyCode::Backspace => app.input.backspace(),
        KeyCode::Delete => app.input.delete(),
        KeyCode::Left => app.input.left(),
        KeyCode::Right => app.input.right(),
        KeyCode::Home => app.input.home(),
        KeyCode::End => app.input.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => app.input.insert(c),
        _ => {}
    }
}

fn submit(app: &mut App, tx: &Sender) {
    if app.chat.is_loading() {
        return;
    }
    let input = app.input.value.clone();
    if app.run_command(&input) {
        app.input.clear();
        return;
    }

    let attachments = std::mem::take(&mut app.attachments);
    let request = app.chat.submit(&input, attachments);
    app.drain_chat_notifications();
    let Some(request) = request else {
        return;
    };

    app.input.clear();
    app.scroll_chat_to_bottom();

    // Stream on a background task; updates come back through the event loop
    let relay = app.relay.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let tx_updates = tx.clone();
        let result = relay
            .stream_turn(&request, |update| {
                let _ = tx_updates.send(AppEvent::Turn(TurnEvent::Update(update)));
            })
            .await;
        let _ = tx.send(AppEvent::Turn(TurnEvent::Finished(result)));
    });
}

fn handle_turn(app: &mut App, event: TurnEvent) {
    match event {
        TurnEvent::Update(update) => app.chat.apply(update),
        TurnEvent::Finished(Ok(content)) => {
            info!("Reply complete ({} chars)", content.chars().count());
            app.chat.finish_turn();
        }
        TurnEvent::Finished(Err(e)) => {
            app.chat.fail_turn(&e);
            app.drain_chat_notifications();
        }
    }
    if app.follow_output {
        app.scroll_chat_to_bottom();
    }
}

fn handle_sources_key(app: &mut App, key: KeyEvent) {
    if ctrl(&key, 's') {
        app.show_sources = false;
        return;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.show_sources = false,
        KeyCode::Up | KeyCode::Char('k') => app.sources_scroll = app.sources_scroll.saturating_sub(1),
        KeyCode::Down | KeyCode::Char('j') => app.sources_scroll = app.sources_scroll.saturating_add(1),
        KeyCode::PageUp => app.sources_scroll = app.sources_scroll.saturating_sub(10),
        KeyCode::PageDown => app.sources_scroll = app.sources_scroll.saturating_add(10),
        _ => {}
    }
}

fn handle_sign_in_key(app: &mut App, key: KeyEvent, tx: &Sender) {
    if app.auth_pending {
        return;
    }
    if ctrl(&key, 'r') {
        app.toggle_auth_mode();
        return;
    }

    match key.code {
        KeyCode::Enter => submit_credentials(app, tx),
        KeyCode::Tab | KeyCode::Down => app.next_auth_field(),
        KeyCode::BackTab | KeyCode::Up => app.prev_auth_field(),
        KeyCode::Backspace => app.focused_auth_input().backspace(),
        KeyCode::Delete => app.focused_auth_input().delete(),
        KeyCode::Left => app.focused_auth_input().left(),
        KeyCode::Right => app.focused_auth_input().right(),
        KeyCode::Home => app.focused_auth_input().home(),
        KeyCode::End => app.focused_auth_input().end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.focused_auth_input().insert(c)
        }
        _ => {}
    }
}

fn submit_credentials(app: &mut App, tx: &Sender) {
    let Some(backend) = app.backend.clone() else {
        return;
    };

    let email = app.email.value.clone();
    let password = app.password.value.clone();
    let username = app.username.value.clone();
    let mode = app.auth_mode;

    // Validate locally first so the form error shows immediately
    let check = match mode {
        AuthMode::SignIn => refai_core::backend::validate_credentials(&email, &password, None),
        AuthMode::SignUp => refai_core::backend::validate_credentials(&email, &password, Some(&username)),
    };
    if let Err(e) = check {
        app.notify(Notification::error("Validation Error", &e.to_string()));
        return;
    }

    app.auth_pending = true;
    let tx = tx.clone();
    tokio::spawn(async move {
        let event = match mode {
            AuthMode::SignIn => BackendEvent::SignedIn(backend.sign_in(&email, &password).await),
            AuthMode::SignUp => BackendEvent::SignedUp(backend.sign_up(&email, &password, &username).await),
        };
        let _ = tx.send(AppEvent::Backend(event));
    });
}

fn handle_paywall_key(app: &mut App, key: KeyEvent, tx: &Sender) {
    match key.code {
        KeyCode::Enter => open_billing_page(app, tx, BillingPage::Checkout),
        KeyCode::Char('r') => check_subscription(app, tx),
        _ => {}
    }
}

fn handle_subscription_key(app: &mut App, key: KeyEvent, tx: &Sender) {
    if ctrl(&key, 'b') {
        app.show_subscription = false;
        return;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.show_subscription = false,
        KeyCode::Char('r') => {
            check_subscription(app, tx);
            app.notify(Notification::info("Refreshed", "Subscription status updated."));
        }
        KeyCode::Char('m') | KeyCode::Enter => open_billing_page(app, tx, BillingPage::Portal),
        _ => {}
    }
}

#[derive(Clone, Copy)]
enum BillingPage {
    Checkout,
    Portal,
}

fn open_billing_page(app: &mut App, tx: &Sender, page: BillingPage) {
    if app.url_pending {
        return;
    }
    let (Some(backend), Some(session)) = (app.backend.clone(), app.session.clone()) else {
        return;
    };

    app.url_pending = true;
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = match page {
            BillingPage::Checkout => backend.create_checkout(&session).await,
            BillingPage::Portal => backend.customer_portal(&session).await,
        };
        let _ = tx.send(AppEvent::Backend(BackendEvent::Url(result)));
    });
}

fn check_subscription(app: &mut App, tx: &Sender) {
    if app.subscription.is_checking() {
        return;
    }
    let (Some(backend), Some(session)) = (app.backend.clone(), app.session.clone()) else {
        return;
    };

    app.subscription.begin_check();
    let tx = tx.clone();
    tokio::spawn(async move {
        let status = match backend.check_subscription(&session).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Subscription check failed: {}", e);
                None
            }
        };
        let _ = tx.send(AppEvent::Backend(BackendEvent::Subscription(status)));
    });
}

fn sign_out(app: &mut App) {
    if let (Some(backend), Some(session)) = (app.backend.clone(), app.session.clone()) {
        tokio::spawn(async move {
            if let Err(e) = backend.sign_out(&session).await {
                warn!("Sign-out request failed: {}", e);
            }
        });
    }
    info!("Signed out");
    app.set_session(None);
}

fn handle_backend(app: &mut App, event: BackendEvent, tx: &Sender) {
    match event {
        BackendEvent::SignedIn(result) => {
            app.auth_pending = false;
            match result {
                Ok(session) => {
                    app.set_session(Some(session));
                    app.notify(Notification::info("Welcome Back!", "Successfully logged in to RefAI."));
                    check_subscription(app, tx);
                }
                Err(e) => app.notify(Notification::error("Login Failed", &auth_error_text(&e))),
            }
        }
        BackendEvent::SignedUp(result) => {
            app.auth_pending = false;
            match result {
                Ok(Some(session)) => {
                    app.set_session(Some(session));
                    app.notify(Notification::info(
                        "Account Created!",
                        "Welcome to RefAI! You can now start chatting.",
                    ));
                    check_subscription(app, tx);
                }
                Ok(None) => {
                    app.toggle_auth_mode();
                    app.notify(Notification::info(
                        "Account Created!",
                        "Confirm your email, then sign in.",
                    ));
                }
                Err(BackendError::AlreadyRegistered) => app.notify(Notification::error(
                    "Account Already Exists",
                    &BackendError::AlreadyRegistered.to_string(),
                )),
                Err(e) => app.notify(Notification::error("Signup Failed", &auth_error_text(&e))),
            }
        }
        BackendEvent::Subscription(status) => {
            app.subscription.record(status, Instant::now());
        }
        BackendEvent::Url(result) => {
            app.url_pending = false;
            match result {
                Ok(Some(url)) => {
                    if let Err(e) = open_in_browser(&url) {
                        warn!("Could not launch browser: {}", e);
                        app.notify(Notification::info("Open in your browser", &url));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Billing page request failed: {}", e);
                    app.notify(Notification::error(
                        "Error",
                        "Failed to open the billing page. Please try again.",
                    ));
                }
            }
        }
    }
}

fn auth_error_text(err: &BackendError) -> String {
    match err {
        BackendError::Status { message, .. } if !message.is_empty() => message.clone(),
        BackendError::Transport(_) => "Could not reach the server".to_string(),
        other => other.to_string(),
    }
}

fn open_in_browser(url: &str) -> std::io::Result<()> {
    let opener = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
    std::process::Command::new(opener)
        .arg(url)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;
    Ok(())
}
