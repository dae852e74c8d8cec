//! HTML content helpers for the broker's operational landing page.
//!
//! The broker has no browser-facing UI — PCoIP clients talk XML, not HTML —
//! but a GET on the single endpoint returns a minimal page for humans
//! checking that the right thing is running.
pub fn landing_page(hostname: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>PCoIP Broker</title>
    <style>
        body {{ font-family: -apple-system, sans-serif; background: #14171a; color: #e6e6e6; margin: 4rem auto; max-width: 40rem; }}
        code {{ background: #24282c; padding: 0.15rem 0.4rem; border-radius: 3px; }}
    </style>
</head>
<body>
    <h1>PCoIP Broker</h1>
    <p>version <code>{version}</code> running on <code>{hostname}</code>.</p>
    <p>PCoIP clients should point at <code>POST /pcoip-broker/xml</code>.</p>
</body>
</html>"#,
        version = env!("CARGO_PKG_VERSION"),
        hostname = hostname,
    )
}
