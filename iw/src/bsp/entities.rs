use glam::Vec3;
use regex::Regex;

use super::IbspEntity;
use crate::error::{Error, Result};

/// Entities that are gameplay markers rather than placeable geometry.
const FILTERED_CLASSES: [&str; 2] = ["spawn", "actor"];
const FILTERED_MODELS: [&str; 1] = ["fx"];

/// The entity lump is a brace-delimited key/value text blob that is
/// almost JSON. Missing commas between objects, between adjacent keys
/// and between key and value are patched in textually before handing
/// the result to a real JSON parser.
pub(crate) fn parse_entities(data: &[u8]) -> Result<Vec<IbspEntity>> {
    let text = std::str::from_utf8(data).map_err(|e| Error::InvalidString {
        offset: e.valid_up_to() as u64,
    })?;

    let mut repaired = format!("[{}]", text.trim_matches(char::from(0)));
    repaired = repaired.replace("}\n{\n", "},\n{\n");
    repaired = repaired.replace("\"\n\"", "\",\n\"");
    repaired = repaired.replace("\" \"", "\":\"");
    repaired = repaired.replace('\\', "/");

    let model_re = Regex::new(r"^xmodel/(.*)").unwrap();

    let parsed = serde_json::from_str::<Vec<serde_json::Value>>(&repaired)?;

    let mut entities = Vec::new();
    for entity in parsed.iter() {
        let Some(name) = entity
            .get("model")
            .and_then(|m| m.as_str())
            .and_then(|model| model_re.captures(model))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };

        if FILTERED_MODELS.contains(&name) {
            continue;
        }

        if let Some(classname) = entity.get("classname").and_then(|c| c.as_str()) {
            if FILTERED_CLASSES.iter().any(|s| classname.contains(s)) {
                continue;
            }
        }

        let angles = transform_field(entity, "angles").unwrap_or(Vec3::ZERO);
        let origin = transform_field(entity, "origin").unwrap_or(Vec3::ZERO);
        let scale = transform_field(entity, "modelscale").unwrap_or(Vec3::ONE);

        entities.push(IbspEntity {
            name: name.to_string(),
            angles,
            origin,
            scale,
        });
    }

    Ok(entities)
}

fn transform_field(entity: &serde_json::Value, key: &str) -> Option<Vec3> {
    entity
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(parse_transform)
}

/// One value broadcasts to all three axes; three values map through as
/// written. Unparseable components fall back to zero, any other shape
/// to the caller's default.
fn parse_transform(transform: &str) -> Option<Vec3> {
    if transform.is_empty() {
        return None;
    }

    let parts = transform.split(' ').collect::<Vec<&str>>();
    match parts.len() {
        3 => Some(Vec3::new(
            parts[0].parse().unwrap_or(0.0),
            parts[1].parse().unwrap_or(0.0),
            parts[2].parse().unwrap_or(0.0),
        )),
        1 => {
            let v = parts[0].parse().unwrap_or(0.0);
            Some(Vec3::splat(v))
        }
        _ => None,
    }
}

#[cfg(test)]
mod entity_tests {
    use super::*;

    #[test]
    fn repaired_blob_yields_placement_fields() {
        let blob = b"{\n\"model\" \"xmodel/foo\"\n\"origin\" \"1 2 3\"\n\"angles\" \"\"\n\"modelscale\" \"2\"\n}\n";
        let entities = parse_entities(blob).unwrap();

        assert_eq!(entities.len(), 1);
        let e = &entities[0];
        assert_eq!(e.name, "foo");
        assert_eq!(e.origin, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(e.angles, Vec3::ZERO);
        assert_eq!(e.scale, Vec3::splat(2.0));
    }

    #[test]
    fn consecutive_objects_get_separating_commas() {
        let blob = b"{\n\"classname\" \"worldspawn\"\n}\n{\n\"model\" \"xmodel/crate_wood\"\n\"origin\" \"4 5 6\"\n}\n";
        let entities = parse_entities(blob).unwrap();

        // worldspawn has no model key and is dropped
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "crate_wood");
        assert_eq!(entities[0].scale, Vec3::ONE);
    }

    #[test]
    fn spawn_markers_and_fx_models_are_filtered() {
        let blob = b"{\n\"classname\" \"actor_enemy\"\n\"model\" \"xmodel/soldier\"\n}\n{\n\"model\" \"xmodel/fx\"\n}\n{\n\"classname\" \"misc_model\"\n\"model\" \"xmodel/barrel\"\n}\n";
        let entities = parse_entities(blob).unwrap();

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "barrel");
    }

    #[test]
    fn backslash_model_paths_are_normalized() {
        // raw blob carries a single backslash, not a JSON escape
        let blob = b"{\n\"model\" \"xmodel\\tree_pine\"\n}\n";
        let entities = parse_entities(blob).unwrap();
        assert_eq!(entities[0].name, "tree_pine");
    }

    #[test]
    fn garbage_blob_is_a_parse_error() {
        assert!(matches!(
            parse_entities(b"{{{not entities"),
            Err(Error::MalformedText(_))
        ));
    }

    #[test]
    fn single_value_broadcasts_and_trailing_nuls_are_trimmed() {
        let blob = b"{\n\"model\" \"xmodel/rock\"\n\"angles\" \"90\"\n}\n\0\0";
        let entities = parse_entities(blob).unwrap();
        assert_eq!(entities[0].angles, Vec3::splat(90.0));
    }
}
