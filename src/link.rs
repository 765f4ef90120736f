//! Dynamic pad linking.
//!
//! Demuxers and uri source bins create their output pads at runtime, once
//! the stream content is known. [`PadLinkRules`] records ahead of time which
//! pad-name prefixes should be connected to which downstream element, and
//! [`PadLinkRules::dispatch`] resolves each `pad-added` event against that
//! table. The table itself holds no graph topology and is immutable once the
//! graph is activated, so dispatch is safe to invoke concurrently from the
//! framework's streaming threads and idempotent for duplicate events.

use std::sync::Arc;

use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use once_cell::sync::Lazy;

use crate::error::Error;

static CAT: Lazy<gst::DebugCategory> = Lazy::new(|| {
    gst::DebugCategory::new(
        "dspipeslink",
        gst::DebugColorFlags::empty(),
        Some("Dynamic pad link dispatcher"),
    )
});

/// The downstream pad a rule connects to.
///
/// Static pads exist from element construction (`h264parse.sink`); request
/// pads are created on demand (`nvstreammux.sink_0`, `matroskamux.video_0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPad {
    Static(String),
    Request(String),
}

impl TargetPad {
    pub fn name(&self) -> &str {
        match self {
            TargetPad::Static(name) | TargetPad::Request(name) => name,
        }
    }
}

/// One registered connection: pads whose name starts with `pad_prefix` are
/// linked to `target_pad` on `target`.
///
/// Generic over the target handle so that rule matching can be exercised
/// without a GStreamer element at hand.
#[derive(Debug, Clone)]
pub struct LinkRule<T = gst::Element> {
    pub pad_prefix: String,
    pub target: T,
    pub target_pad: TargetPad,
}

/// Finds the unique rule whose prefix matches `pad_name`.
///
/// Zero matches is not an error: a demuxer may announce media types the
/// graph deliberately does not consume. More than one match means the
/// registry itself is misconfigured and resolution must not proceed.
pub fn match_rule<'a, T>(
    rules: &'a [LinkRule<T>],
    pad_name: &str,
) -> Result<Option<&'a LinkRule<T>>, Error> {
    let mut hits = rules.iter().filter(|r| pad_name.starts_with(&r.pad_prefix));
    match (hits.next(), hits.next()) {
        (None, _) => Ok(None),
        (Some(rule), None) => Ok(Some(rule)),
        (Some(_), Some(_)) => Err(Error::AmbiguousPad {
            pad: pad_name.to_string(),
            matches: rules
                .iter()
                .filter(|r| pad_name.starts_with(&r.pad_prefix))
                .count(),
        }),
    }
}

/// Rule table for resolving `pad-added` events.
///
/// All rules are registered during graph construction; `register` never
/// checks that the target pad exists, since the target element may not be
/// linkable yet at registration time.
#[derive(Debug, Default, Clone)]
pub struct PadLinkRules {
    rules: Vec<LinkRule>,
}

impl PadLinkRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pad_prefix: &str, target: &gst::Element, target_pad: TargetPad) {
        self.rules.push(LinkRule {
            pad_prefix: pad_prefix.to_string(),
            target: target.clone(),
            target_pad,
        });
    }

    pub fn rules(&self) -> &[LinkRule] {
        &self.rules
    }

    /// Resolves one newly created pad against the rule table.
    ///
    /// An already-linked target pad is skipped silently: some framework
    /// versions fire `pad-added` more than once for the same logical stream.
    pub fn dispatch(&self, element: &gst::Element, pad: &gst::Pad) -> Result<(), Error> {
        let pad_name = pad.name();
        gst::debug!(CAT, obj = element, "new pad '{}'", pad_name);

        let rule = match match_rule(&self.rules, &pad_name)? {
            Some(rule) => rule,
            None => {
                gst::debug!(
                    CAT,
                    obj = element,
                    "pad '{}' matches no link rule, leaving unconnected",
                    pad_name
                );
                return Ok(());
            }
        };

        let sink_pad = match &rule.target_pad {
            TargetPad::Static(name) => rule.target.static_pad(name),
            // A request pad created by an earlier event is visible as a
            // static pad afterwards; check there first so duplicate events
            // do not request a second pad.
            TargetPad::Request(name) => rule
                .target
                .static_pad(name)
                .or_else(|| rule.target.request_pad_simple(name)),
        }
        .ok_or_else(|| Error::MissingPad {
            element: rule.target.name().to_string(),
            pad: rule.target_pad.name().to_string(),
        })?;

        if sink_pad.is_linked() {
            gst::debug!(
                CAT,
                obj = element,
                "'{}:{}' already linked, ignoring duplicate pad-added",
                rule.target.name(),
                sink_pad.name()
            );
            return Ok(());
        }

        pad.link(&sink_pad).map_err(|err| Error::LinkFailed {
            src: format!("{}:{}", element.name(), pad_name),
            dest: format!("{}:{}", rule.target.name(), sink_pad.name()),
            reason: format!("{err:?}"),
        })?;

        gst::info!(
            CAT,
            obj = element,
            "linked '{}:{}' -> '{}:{}'",
            element.name(),
            pad_name,
            rule.target.name(),
            sink_pad.name()
        );
        Ok(())
    }

    /// Installs the dispatcher on the element's `pad-added` signal.
    ///
    /// A failed resolution is a configuration bug, so it is posted as an
    /// element error; the bus loop turns that into an aborted startup.
    pub fn connect_pad_added(self, element: &gst::Element) -> glib::SignalHandlerId {
        let rules = Arc::new(self);
        element.connect_pad_added(move |element, pad| {
            if let Err(err) = rules.dispatch(element, pad) {
                gst::error!(CAT, obj = element, "pad link dispatch failed: {}", err);
                gst::element_error!(
                    element,
                    gst::CoreError::Negotiation,
                    ["pad link dispatch failed: {}", err]
                );
            }
        })
    }
}
