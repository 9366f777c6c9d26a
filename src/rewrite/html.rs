//! Streaming HTML rewriting.
//!
//! Documents get three treatments on their way to the browser: the client
//! bundle and a tokenized `<base>` are injected at the top of `<head>`, the
//! `<body>` is stamped with the URL the page was fetched from, and inline
//! scripts go through the location shim pass. Documents that never open a
//! `<head>` get the injection block prepended to the whole document instead.

use std::cell::RefCell;
use std::rc::Rc;

use lol_html::errors::RewritingError;
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, text, RewriteStrSettings};

use crate::origin::ORIGIN_PARAM;
use crate::rewrite::{js, RewriteContext};

/// Client bundle scripts injected into every document, in load order.
pub const BOOTSTRAP_SCRIPTS: [&str; 7] = [
    "t_r_a_c_k.js",
    "rewrite-dom.js",
    "ppp-ui.js",
    "cookies-hook.js",
    "location-hook.js",
    "functions.js",
    "main.js",
];

#[derive(Default)]
struct ScriptState {
    skip: bool,
    buffer: String,
}

/// Markup inserted at the top of `<head>`. The `<base>` carries the marker
/// attribute that doubles as the injection sentinel, so a document that has
/// been through the proxy once is recognizable.
fn injection_block(ctx: &RewriteContext) -> String {
    let mut block = format!(
        "<base {} href=\"{}\">\n<meta http-equiv=\"Content-Security-Policy\" content=\"upgrade-insecure-requests\">\n",
        ORIGIN_PARAM, ctx.fetch_url
    );
    for script in BOOTSTRAP_SCRIPTS {
        block.push_str(&format!(
            "<script src=\"{}/js/{}\"></script>\n",
            ctx.asset_base, script
        ));
    }
    block
}

pub fn rewrite(html: &str, ctx: &RewriteContext) -> Result<String, RewritingError> {
    let block = injection_block(ctx);
    let already_injected = html.contains(&format!("<base {} ", ORIGIN_PARAM));
    let injected = Rc::new(RefCell::new(false));
    let script_state = Rc::new(RefCell::new(ScriptState::default()));
    let fetch_url = ctx.fetch_url.as_str().to_string();

    let head_block = block.clone();
    let head_injected = Rc::clone(&injected);
    let element_state = Rc::clone(&script_state);
    let text_state = Rc::clone(&script_state);

    let out = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("head", move |el| {
                    if !already_injected && !*head_injected.borrow() {
                        el.prepend(&head_block, ContentType::Html);
                        *head_injected.borrow_mut() = true;
                    }
                    Ok(())
                }),
                element!("body", move |el| {
                    el.set_attribute("data-origin-url", &fetch_url)?;
                    Ok(())
                }),
                element!("script", move |el| {
                    let mut state = element_state.borrow_mut();
                    state.skip = el.get_attribute("src").is_some();
                    state.buffer.clear();
                    Ok(())
                }),
                // Inline script text arrives in chunks; buffer until the last
                // one so the shim regex sees whole statements.
                text!("script", move |chunk| {
                    let mut state = text_state.borrow_mut();
                    if state.skip {
                        return Ok(());
                    }
                    state.buffer.push_str(chunk.as_str());
                    if chunk.last_in_text_node() {
                        let rewritten = js::rewrite_location_members(&state.buffer);
                        chunk.replace(&rewritten, ContentType::Html);
                        state.buffer.clear();
                    } else {
                        chunk.remove();
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )?;

    if already_injected || *injected.borrow() {
        Ok(out)
    } else {
        // No <head> ever opened; the block goes in front of the document.
        Ok(format!("{}{}", block, out))
    }
}
