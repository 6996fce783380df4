use chrono::Utc;
use listflow::jobs::model::Campaign;
use listflow::render::{self, Branding, LogoPosition, Recipient, UnsubscribeSigner};
use uuid::Uuid;

fn campaign(subject: &str, body: &str) -> Campaign {
    Campaign {
        id: Uuid::new_v4(),
        subject: subject.to_string(),
        body: body.to_string(),
        list_ids: Vec::new(),
        status: "sent".to_string(),
        sent_count: 0,
        created_at: Utc::now(),
        sent_at: None,
    }
}

fn signer() -> UnsubscribeSigner {
    UnsubscribeSigner::new("https://news.example.com/", "test-secret")
}

#[test]
fn token_is_deterministic_per_email_and_list() {
    let signer = signer();
    let list = Uuid::new_v4();
    let other_list = Uuid::new_v4();

    let token = signer.token("alice@example.com", list);
    assert_eq!(token, signer.token("alice@example.com", list));
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

    assert_ne!(token, signer.token("bob@example.com", list));
    assert_ne!(token, signer.token("alice@example.com", other_list));
}

#[test]
fn link_encodes_the_email_and_carries_token_and_list() {
    let signer = signer();
    let list = Uuid::new_v4();
    let link = signer.link("alice+news@example.com", list);

    assert!(link.starts_with("https://news.example.com/unsubscribe?email="));
    assert!(link.contains("alice%2Bnews%40example.com"));
    assert!(link.contains(&format!("token={}", signer.token("alice+news@example.com", list))));
    assert!(link.ends_with(&format!("list_id={list}")));
}

#[test]
fn rendered_message_contains_body_and_unsubscribe_link() {
    let campaign = campaign("Launch", "<p>Big news</p>");
    let signer = signer();
    let list = Uuid::new_v4();
    let recipient = Recipient {
        email: "alice@example.com".to_string(),
    };

    let payload = render::render(&campaign, &Branding::default(), &signer, list, &recipient);

    assert_eq!(payload.subject, "Launch");
    assert!(payload.html_body.contains("<p>Big news</p>"));
    assert!(payload
        .html_body
        .contains(&signer.link("alice@example.com", list)));
}

#[test]
fn footer_fields_are_escaped_and_newlines_become_breaks() {
    let campaign = campaign("Subject", "<p>Body</p>");
    let branding = Branding {
        footer_company_name: Some("Acme & Sons".to_string()),
        footer_address: Some("1 Main St\nSpringfield".to_string()),
        ..Branding::default()
    };
    let recipient = Recipient {
        email: "alice@example.com".to_string(),
    };

    let payload = render::render(&campaign, &branding, &signer(), Uuid::new_v4(), &recipient);

    assert!(payload.html_body.contains("Acme &amp; Sons"));
    assert!(!payload.html_body.contains("Acme & Sons"));
    assert!(payload.html_body.contains("1 Main St<br>Springfield"));
}

#[test]
fn logo_block_follows_the_configured_alignment() {
    let campaign = campaign("Subject", "<p>Body</p>");
    let branding = Branding {
        logo_url: Some("https://cdn.example.com/logo.png".to_string()),
        logo_name: Some("Acme".to_string()),
        logo_position: Some(LogoPosition::Left),
        ..Branding::default()
    };
    let recipient = Recipient {
        email: "alice@example.com".to_string(),
    };

    let payload = render::render(&campaign, &branding, &signer(), Uuid::new_v4(), &recipient);

    assert!(payload.html_body.contains("text-align: left"));
    assert!(payload
        .html_body
        .contains("src='https://cdn.example.com/logo.png'"));
    assert!(payload.html_body.contains(">Acme</div>"));
}

#[test]
fn no_branding_still_renders_an_unsubscribe_link() {
    let campaign = campaign("Subject", "<p>Body</p>");
    let recipient = Recipient {
        email: "alice@example.com".to_string(),
    };

    let payload = render::render(
        &campaign,
        &Branding::default(),
        &signer(),
        Uuid::new_v4(),
        &recipient,
    );

    assert!(payload.html_body.contains(">Unsubscribe</a>"));
    // Without logo settings there is no header block at all.
    assert!(!payload.html_body.contains("border-bottom"));
}

#[test]
fn logo_position_parses_case_insensitively_with_center_default() {
    assert_eq!(LogoPosition::parse("LEFT"), LogoPosition::Left);
    assert_eq!(LogoPosition::parse(" right "), LogoPosition::Right);
    assert_eq!(LogoPosition::parse("center"), LogoPosition::Center);
    assert_eq!(LogoPosition::parse("sideways"), LogoPosition::Center);
}
