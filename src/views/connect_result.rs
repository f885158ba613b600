//! Discord 接続結果ページの描画
//!
//! `ConnectOutcome` から HTML を生成する純粋関数。I/O は行わない。

use crate::models::ErrorDetail;
use crate::services::connect_result::{ConnectOutcome, ConnectedAccount};
use crate::views::escape_html;

pub const CURRICULUM_PATH: &str = "/curriculum";
pub const LOGIN_PATH: &str = "/login";

const ALREADY_CONNECTED_MESSAGE: &str =
    "The account you're trying to connect with is already connected with one of c0d3 accounts.";

const AVATAR_SIZE: u32 = 120;

/// エラー画面の本文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorMessage<'a> {
    LoginRequired,
    Retry { username: &'a str },
    AlreadyConnected,
}

impl<'a> ErrorMessage<'a> {
    /// ユーザー名が空なら未ログイン扱い
    fn for_username(username: Option<&'a str>) -> Self {
        match username.map(str::trim) {
            Some(name) if !name.is_empty() => Self::Retry { username: name },
            _ => Self::LoginRequired,
        }
    }

    fn to_html(self) -> String {
        match self {
            Self::LoginRequired => format!(
                r#"<p>You need to be logged in to connect to Discord.</p>
<p>or go straight <a href="{path}">to the curriculum</a> without an account</p>"#,
                path = CURRICULUM_PATH,
            ),
            Self::Retry { username } => format!(
                "<p>Dear {}, we had trouble connecting to Discord, please try again.</p>",
                escape_html(username)
            ),
            Self::AlreadyConnected => format!("<p>{}</p>", escape_html(ALREADY_CONNECTED_MESSAGE)),
        }
    }
}

struct ErrorPage<'a> {
    message: ErrorMessage<'a>,
    error: Option<&'a ErrorDetail>,
    nav_path: &'a str,
    nav_text: &'a str,
}

/// 接続結果ページを描画
///
/// # Arguments
/// * `outcome` - 判定結果
/// * `support_url` - エラー時に案内するサポートチャンネル
pub fn render_connect_result(outcome: &ConnectOutcome, support_url: &str) -> String {
    match outcome {
        ConnectOutcome::ProviderError { username, error } => render_error_page(
            &ErrorPage {
                message: ErrorMessage::for_username(Some(username.as_str())),
                error: error.as_ref(),
                nav_path: CURRICULUM_PATH,
                nav_text: "Try Again",
            },
            support_url,
        ),
        ConnectOutcome::NotLoggedIn => render_error_page(
            &ErrorPage {
                message: ErrorMessage::for_username(None),
                error: None,
                nav_path: LOGIN_PATH,
                nav_text: "Log In Here",
            },
            support_url,
        ),
        ConnectOutcome::AlreadyConnectedElsewhere => render_error_page(
            &ErrorPage {
                message: ErrorMessage::AlreadyConnected,
                error: None,
                nav_path: CURRICULUM_PATH,
                nav_text: "Already connected",
            },
            support_url,
        ),
        ConnectOutcome::Connected { username, account } => {
            render_success_page(username, account)
        }
    }
}

fn render_error_page(page: &ErrorPage<'_>, support_url: &str) -> String {
    let body = format!(
        r#"<div class="mt-3">{message}</div>
<p>If this problem persists, please ask for help in our <a href="{support_url}" target="_blank" rel="noopener noreferrer">Discord channel.</a></p>
{button}
{error_log}"#,
        message = page.message.to_html(),
        support_url = escape_html(support_url),
        button = nav_button(page.nav_path, page.nav_text),
        error_log = page.error.map(render_error_log).unwrap_or_default(),
    );

    layout("Error", &body)
}

/// message が空のエラーは表示しない
fn render_error_log(error: &ErrorDetail) -> String {
    if !error.has_message() {
        return String::new();
    }

    let dump = serde_json::to_string_pretty(error).unwrap_or_else(|_| error.message.clone());
    format!(
        r#"<details class="error-log">
<summary>Error log</summary>
<hr />
<pre>{}</pre>
</details>"#,
        escape_html(&dump)
    )
}

fn render_success_page(username: &str, account: &ConnectedAccount) -> String {
    let body = format!(
        r#"<div class="ms-auto me-auto">
<img class="avatar" src="{avatar_url}" width="{size}" height="{size}" alt="" />
</div>
<h5 class="mb-4"><a href="{profile_url}">{discord_name}</a></h5>
<p>{username}, you are now connected to Discord!</p>
{button}"#,
        avatar_url = escape_html(account.avatar_url()),
        size = AVATAR_SIZE,
        profile_url = escape_html(&account.profile_url()),
        discord_name = escape_html(account.username()),
        username = escape_html(username),
        button = nav_button(CURRICULUM_PATH, "Continue to Curriculum"),
    );

    layout("Success!", &body)
}

fn nav_button(path: &str, text: &str) -> String {
    format!(
        r#"<a href="{}"><button type="button" class="btn btn-primary btn-lg btn-block mb-3">{}</button></a>"#,
        escape_html(path),
        escape_html(text)
    )
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        .card {{ max-width: 480px; margin: 2rem auto; padding: 2rem; text-align: center; }}
        .avatar {{ border-radius: 50%; }}
        pre {{ text-align: left; white-space: pre-wrap; }}
    </style>
</head>
<body>
    <div class="card">
        <h1 class="card-title">{title}</h1>
        {body}
    </div>
</body>
</html>"#,
        title = escape_html(title),
        body = body,
    )
}
