//! Campaign rendering: merges a campaign body with branding and a compliance
//! footer into the final HTML payload for one recipient.
//!
//! Rendering is a pure function of its inputs. The only per-recipient piece
//! is the unsubscribe link, which is a deterministic keyed digest of
//! (email, list) so it never has to be stored per send.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::jobs::model::Campaign;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogoPosition {
    Left,
    Center,
    Right,
}

impl LogoPosition {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "left" => LogoPosition::Left,
            "right" => LogoPosition::Right,
            _ => LogoPosition::Center,
        }
    }

    fn css_align(self) -> &'static str {
        match self {
            LogoPosition::Left => "left",
            LogoPosition::Center => "center",
            LogoPosition::Right => "right",
        }
    }
}

/// Operator-supplied branding and compliance footer fields. All free-text
/// fields are HTML-escaped at render time.
#[derive(Clone, Debug, Default)]
pub struct Branding {
    pub logo_url: Option<String>,
    pub logo_name: Option<String>,
    pub logo_position: Option<LogoPosition>,
    pub footer_text: Option<String>,
    pub footer_company_name: Option<String>,
    pub footer_address: Option<String>,
    pub footer_email: Option<String>,
    pub footer_phone: Option<String>,
    pub footer_website_url: Option<String>,
    pub footer_privacy_url: Option<String>,
}

impl Branding {
    fn position(&self) -> LogoPosition {
        self.logo_position.unwrap_or(LogoPosition::Center)
    }
}

/// Derives recipient-specific unsubscribe links.
///
/// The token is HMAC-SHA256 over `email:list_id` keyed with a
/// per-installation secret: deterministic for a given (email, list) pair,
/// not enumerable without the key.
#[derive(Clone, Debug)]
pub struct UnsubscribeSigner {
    base_url: String,
    secret: String,
}

impl UnsubscribeSigner {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            secret: secret.into(),
        }
    }

    pub fn token(&self, email: &str, list_id: Uuid) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(email.as_bytes());
        mac.update(b":");
        mac.update(list_id.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn link(&self, email: &str, list_id: Uuid) -> String {
        format!(
            "{}/unsubscribe?email={}&token={}&list_id={}",
            self.base_url,
            percent_encode(email),
            self.token(email, list_id),
            list_id
        )
    }
}

#[derive(Clone, Debug)]
pub struct Recipient {
    pub email: String,
}

#[derive(Clone, Debug)]
pub struct MessagePayload {
    pub subject: String,
    pub html_body: String,
}

/// Renders the final message for one recipient: logo block, campaign body
/// verbatim, compliance footer with the recipient's unsubscribe link.
pub fn render(
    campaign: &Campaign,
    branding: &Branding,
    signer: &UnsubscribeSigner,
    unsubscribe_list: Uuid,
    recipient: &Recipient,
) -> MessagePayload {
    let logo_html = render_logo(branding);
    let footer_html = render_footer(branding, signer, unsubscribe_list, &recipient.email);

    let html_body = format!(
        "<html>\n<head>\n<style>\n\
         body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Arial, sans-serif; \
         line-height: 1.6; color: #1f2937; margin: 0; padding: 0; }}\n\
         .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}\n\
         img {{ max-width: 100%; height: auto; }}\n\
         </style>\n</head>\n<body>\n<div class='container'>\n{logo_html}{body}\n{footer_html}</div>\n</body>\n</html>",
        body = campaign.body,
    );

    MessagePayload {
        subject: campaign.subject.clone(),
        html_body,
    }
}

fn render_logo(branding: &Branding) -> String {
    let has_logo = branding.logo_url.as_deref().is_some_and(|s| !s.is_empty());
    let has_name = branding.logo_name.as_deref().is_some_and(|s| !s.is_empty());
    if !has_logo && !has_name {
        return String::new();
    }

    let align = branding.position().css_align();
    let mut html = format!(
        "<div style='text-align: {align}; margin-bottom: 30px; padding-bottom: 20px; border-bottom: 1px solid #ddd;'>"
    );
    if let Some(url) = branding.logo_url.as_deref().filter(|s| !s.is_empty()) {
        html.push_str(&format!(
            "<img src='{}' alt='Logo' style='max-width: 200px; height: auto; display: inline-block;'><br>",
            html_escape(url)
        ));
    }
    if let Some(name) = branding.logo_name.as_deref().filter(|s| !s.is_empty()) {
        html.push_str(&format!(
            "<div style='font-size: 20px; font-weight: bold; color: #333; margin-top: 10px;'>{}</div>",
            html_escape(name)
        ));
    }
    html.push_str("</div>\n");
    html
}

fn render_footer(
    branding: &Branding,
    signer: &UnsubscribeSigner,
    unsubscribe_list: Uuid,
    email: &str,
) -> String {
    let align = branding.position().css_align();
    let mut html = format!(
        "<div style='margin-top: 40px; padding-top: 20px; border-top: 2px solid #e5e7eb; \
         font-size: 13px; color: #6b7280; line-height: 1.8; text-align: {align};'>"
    );

    if let Some(text) = branding.footer_text.as_deref().filter(|s| !s.is_empty()) {
        html.push_str(&format!(
            "<p style='margin: 0 0 15px 0;'>{}</p>",
            nl2br(&html_escape(text))
        ));
    }

    if let Some(name) = branding
        .footer_company_name
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        html.push_str(&format!(
            "<p style='margin: 0 0 10px 0; color: #374151; font-weight: 500;'>{}</p>",
            html_escape(name)
        ));
    }
    if let Some(addr) = branding.footer_address.as_deref().filter(|s| !s.is_empty()) {
        html.push_str(&format!(
            "<p style='margin: 0 0 10px 0;'>{}</p>",
            nl2br(&html_escape(addr))
        ));
    }

    let mut contact = Vec::new();
    if let Some(mail) = branding.footer_email.as_deref().filter(|s| !s.is_empty()) {
        let mail = html_escape(mail);
        contact.push(format!(
            "<a href='mailto:{mail}' style='color: #6b7280; text-decoration: none;'>{mail}</a>"
        ));
    }
    if let Some(phone) = branding.footer_phone.as_deref().filter(|s| !s.is_empty()) {
        contact.push(html_escape(phone));
    }
    if !contact.is_empty() {
        html.push_str(&format!(
            "<p style='margin: 0 0 10px 0;'>{}</p>",
            contact.join(" &nbsp;&middot;&nbsp; ")
        ));
    }

    let mut links = Vec::new();
    if let Some(url) = branding
        .footer_website_url
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        links.push(format!(
            "<a href='{}' style='color: #6b7280; text-decoration: underline;'>Visit Website</a>",
            html_escape(url)
        ));
    }
    if let Some(url) = branding
        .footer_privacy_url
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        links.push(format!(
            "<a href='{}' style='color: #6b7280; text-decoration: underline;'>Privacy Policy</a>",
            html_escape(url)
        ));
    }
    links.push(format!(
        "<a href='{}' style='color: #6b7280; text-decoration: underline;'>Unsubscribe</a>",
        signer.link(email, unsubscribe_list)
    ));
    html.push_str(&format!(
        "<p style='margin: 10px 0 0 0;'>{}</p>",
        links.join(" &nbsp;&middot;&nbsp; ")
    ));

    html.push_str("</div>\n");
    html
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn nl2br(input: &str) -> String {
    input.replace("\r\n", "<br>").replace('\n', "<br>")
}

// Query-value percent encoding, RFC 3986 unreserved characters left as-is.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
