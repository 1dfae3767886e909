//! Streaming osmChange parser.
//!
//! Only node children of `<create>`, `<modify>`, and `<delete>` wrappers
//! are produced; way and relation subtrees are skipped without buffering
//! them. Attribute typing is strict: a diff with a garbled `id` is
//! rejected rather than silently dropped.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use openaedmap_source_models::{DiffNode, NodeAction};

use crate::SourceError;

/// The action wrapper currently being read.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ActionKind {
    Create,
    Modify,
    Delete,
}

/// A node element whose attributes and tags are still being collected.
#[derive(Debug, Default)]
struct PendingNode {
    id: Option<i64>,
    version: Option<i64>,
    lon: Option<f64>,
    lat: Option<f64>,
    tags: BTreeMap<String, String>,
}

fn malformed(message: impl Into<String>) -> SourceError {
    SourceError::MalformedDiff {
        message: message.into(),
    }
}

/// Parses a decompressed osmChange document into typed node actions.
///
/// # Errors
///
/// Returns [`SourceError::MalformedDiff`] on invalid XML, an unknown
/// action wrapper, or a node attribute that fails strict typing.
pub fn parse_osm_change(xml: &str) -> Result<Vec<NodeAction>, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut actions: Vec<NodeAction> = Vec::new();
    let mut current_action: Option<ActionKind> = None;
    let mut current_node: Option<PendingNode> = None;
    let mut root_seen = false;
    let mut skip_depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(format!("Invalid XML at byte {}: {e}", reader.buffer_position())))?;

        match event {
            Event::Eof => break,
            Event::Start(element) => {
                if skip_depth > 0 {
                    skip_depth += 1;
                    continue;
                }
                match handle_open(
                    &element,
                    &mut current_action,
                    &mut current_node,
                    &mut root_seen,
                )? {
                    Open::Entered => {}
                    Open::Skip => skip_depth = 1,
                }
            }
            Event::Empty(element) => {
                if skip_depth > 0 {
                    continue;
                }
                match handle_open(
                    &element,
                    &mut current_action,
                    &mut current_node,
                    &mut root_seen,
                )? {
                    Open::Entered => {
                        // A self-closing element closes immediately.
                        handle_close(
                            element.name().as_ref(),
                            &mut current_action,
                            &mut current_node,
                            &mut actions,
                        )?;
                    }
                    Open::Skip => {}
                }
            }
            Event::End(element) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                handle_close(
                    element.name().as_ref(),
                    &mut current_action,
                    &mut current_node,
                    &mut actions,
                )?;
            }
            _ => {}
        }
    }

    if !root_seen {
        return Err(malformed("Missing osmChange root element"));
    }

    Ok(actions)
}

/// Outcome of opening an element.
enum Open {
    /// The element was consumed; its children are interesting.
    Entered,
    /// The element's whole subtree is irrelevant.
    Skip,
}

fn handle_open(
    element: &BytesStart<'_>,
    current_action: &mut Option<ActionKind>,
    current_node: &mut Option<PendingNode>,
    root_seen: &mut bool,
) -> Result<Open, SourceError> {
    match element.name().as_ref() {
        b"osmChange" => {
            *root_seen = true;
            Ok(Open::Entered)
        }
        b"create" if current_action.is_none() => {
            *current_action = Some(ActionKind::Create);
            Ok(Open::Entered)
        }
        b"modify" if current_action.is_none() => {
            *current_action = Some(ActionKind::Modify);
            Ok(Open::Entered)
        }
        b"delete" if current_action.is_none() => {
            *current_action = Some(ActionKind::Delete);
            Ok(Open::Entered)
        }
        b"node" if current_action.is_some() => {
            *current_node = Some(parse_node_attributes(element)?);
            Ok(Open::Entered)
        }
        b"way" | b"relation" if current_action.is_some() => Ok(Open::Skip),
        b"tag" => {
            if let Some(node) = current_node.as_mut() {
                let (key, value) = parse_tag_attributes(element)?;
                node.tags.insert(key, value);
            }
            Ok(Open::Entered)
        }
        name if current_action.is_none() && *root_seen => Err(malformed(format!(
            "Unknown action wrapper: {}",
            String::from_utf8_lossy(name)
        ))),
        // Unrecognized elements inside an action (e.g. bounds) are skipped.
        _ => Ok(Open::Skip),
    }
}

fn handle_close(
    name: &[u8],
    current_action: &mut Option<ActionKind>,
    current_node: &mut Option<PendingNode>,
    actions: &mut Vec<NodeAction>,
) -> Result<(), SourceError> {
    match name {
        b"node" => {
            let node = current_node
                .take()
                .ok_or_else(|| malformed("Unexpected node close"))?;
            let kind = current_action.ok_or_else(|| malformed("Node outside action wrapper"))?;
            actions.push(finalize_node(kind, node)?);
        }
        b"create" | b"modify" | b"delete" => {
            *current_action = None;
        }
        _ => {}
    }
    Ok(())
}

fn finalize_node(kind: ActionKind, node: PendingNode) -> Result<NodeAction, SourceError> {
    let id = node.id.ok_or_else(|| malformed("Node missing id"))?;
    let version = node
        .version
        .ok_or_else(|| malformed(format!("Node {id} missing version")))?;

    if kind == ActionKind::Delete {
        return Ok(NodeAction::Delete { id, version });
    }

    let lon = node
        .lon
        .ok_or_else(|| malformed(format!("Node {id} missing lon")))?;
    let lat = node
        .lat
        .ok_or_else(|| malformed(format!("Node {id} missing lat")))?;

    let node = DiffNode {
        id,
        version,
        lon,
        lat,
        tags: node.tags,
    };

    Ok(match kind {
        ActionKind::Create => NodeAction::Create(node),
        ActionKind::Modify => NodeAction::Modify(node),
        ActionKind::Delete => unreachable!("delete handled above"),
    })
}

fn parse_node_attributes(element: &BytesStart<'_>) -> Result<PendingNode, SourceError> {
    let mut node = PendingNode::default();

    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| malformed(format!("Invalid attribute: {e}")))?;
        let value = attribute
            .unescape_value()
            .map_err(|e| malformed(format!("Invalid attribute value: {e}")))?;

        match attribute.key.as_ref() {
            b"id" => node.id = Some(parse_integer("id", &value)?),
            b"version" => node.version = Some(parse_version(&value)?),
            b"lon" => node.lon = Some(parse_double("lon", &value)?),
            b"lat" => node.lat = Some(parse_double("lat", &value)?),
            // Validated for strictness even though they are not retained.
            b"changeset" => {
                parse_integer("changeset", &value)?;
            }
            b"uid" => {
                parse_integer("uid", &value)?;
            }
            b"ref" => {
                parse_integer("ref", &value)?;
            }
            _ => {}
        }
    }

    Ok(node)
}

fn parse_tag_attributes(element: &BytesStart<'_>) -> Result<(String, String), SourceError> {
    let mut key = None;
    let mut value = None;

    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| malformed(format!("Invalid attribute: {e}")))?;
        let text = attribute
            .unescape_value()
            .map_err(|e| malformed(format!("Invalid attribute value: {e}")))?;
        match attribute.key.as_ref() {
            b"k" => key = Some(text.into_owned()),
            b"v" => value = Some(text.into_owned()),
            _ => {}
        }
    }

    match (key, value) {
        (Some(key), Some(value)) => Ok((key, value)),
        _ => Err(malformed("Tag element missing k or v")),
    }
}

fn parse_integer(name: &str, value: &str) -> Result<i64, SourceError> {
    value
        .parse::<i64>()
        .map_err(|_| malformed(format!("Invalid integer {name}: {value:?}")))
}

/// Older dumps carry versions as floats (`"2.0"`); tolerate those.
fn parse_version(value: &str) -> Result<i64, SourceError> {
    if let Ok(version) = value.parse::<i64>() {
        return Ok(version);
    }
    value
        .parse::<f64>()
        .map(|v| {
            #[allow(clippy::cast_possible_truncation)]
            {
                v as i64
            }
        })
        .map_err(|_| malformed(format!("Invalid version: {value:?}")))
}

fn parse_double(name: &str, value: &str) -> Result<f64, SourceError> {
    value
        .parse::<f64>()
        .map_err(|_| malformed(format!("Invalid double {name}: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osmChange version="0.6" generator="osmdbt">
  <create>
    <node id="1" version="1" changeset="10" uid="5" lat="52.23" lon="21.01">
      <tag k="emergency" v="defibrillator"/>
      <tag k="access" v="yes"/>
    </node>
  </create>
  <modify>
    <node id="2" version="7" changeset="11" uid="5" lat="50.06" lon="19.94"/>
    <way id="3" version="2" changeset="11" uid="5">
      <nd ref="1"/>
      <tag k="highway" v="residential"/>
    </way>
  </modify>
  <delete>
    <node id="4" version="9" changeset="12" uid="6"/>
    <relation id="5" version="1" changeset="12" uid="6">
      <member type="node" ref="1" role=""/>
    </relation>
  </delete>
</osmChange>"#;

    #[test]
    fn parses_node_actions_and_skips_ways_and_relations() {
        let actions = parse_osm_change(SAMPLE).unwrap();
        assert_eq!(actions.len(), 3);

        let NodeAction::Create(created) = &actions[0] else {
            panic!("expected create, got {:?}", actions[0]);
        };
        assert_eq!(created.id, 1);
        assert_eq!(created.version, 1);
        assert!((created.lon - 21.01).abs() < 1e-9);
        assert_eq!(created.tags.get("emergency").unwrap(), "defibrillator");

        let NodeAction::Modify(modified) = &actions[1] else {
            panic!("expected modify, got {:?}", actions[1]);
        };
        assert_eq!(modified.id, 2);
        assert!(modified.tags.is_empty());

        assert_eq!(actions[2], NodeAction::Delete { id: 4, version: 9 });
    }

    #[test]
    fn tolerates_float_versions() {
        let xml = r#"<osmChange>
            <modify><node id="1" version="2.0" lat="0.0" lon="0.0"/></modify>
        </osmChange>"#;
        let actions = parse_osm_change(xml).unwrap();
        assert_eq!(actions[0].version(), 2);
    }

    #[test]
    fn rejects_unknown_action_wrappers() {
        let xml = r#"<osmChange><upsert><node id="1" version="1" lat="0" lon="0"/></upsert></osmChange>"#;
        let error = parse_osm_change(xml).unwrap_err();
        assert!(matches!(error, SourceError::MalformedDiff { .. }));
    }

    #[test]
    fn rejects_garbled_attributes() {
        let xml = r#"<osmChange>
            <create><node id="abc" version="1" lat="0.0" lon="0.0"/></create>
        </osmChange>"#;
        assert!(parse_osm_change(xml).is_err());

        let xml = r#"<osmChange>
            <create><node id="1" version="1" lat="north" lon="0.0"/></create>
        </osmChange>"#;
        assert!(parse_osm_change(xml).is_err());
    }

    #[test]
    fn rejects_missing_root() {
        assert!(parse_osm_change("<create></create>").is_err());
    }

    #[test]
    fn delete_does_not_require_coordinates() {
        let xml = r#"<osmChange><delete><node id="7" version="3"/></delete></osmChange>"#;
        let actions = parse_osm_change(xml).unwrap();
        assert_eq!(actions[0], NodeAction::Delete { id: 7, version: 3 });
    }
}
