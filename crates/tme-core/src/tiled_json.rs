//! Tiled JSON writer: `map.json` and `.tsj` tilesets.

use crate::export::{ExportConfig, ExportDocument, ExportLayer, TILED_FORMAT_VERSION, TilesetRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonMap {
    pub compressionlevel: i32,
    pub width: u32,
    pub height: u32,
    pub infinite: bool,
    pub layers: Vec<JsonLayer>,
    pub nextlayerid: u32,
    pub nextobjectid: u32,
    pub orientation: String,
    pub renderorder: String,
    pub tiledversion: String,
    pub tilewidth: u32,
    pub tileheight: u32,
    pub tilesets: Vec<JsonTilesetRef>,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonTilesetRef {
    pub firstgid: u32,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonLayer {
    #[serde(rename = "tilelayer")]
    Tiles {
        id: u32,
        name: String,
        width: u32,
        height: u32,
        opacity: f32,
        visible: bool,
        x: i32,
        y: i32,
        data: Vec<u32>,
    },
    #[serde(rename = "group")]
    Group {
        id: u32,
        name: String,
        opacity: f32,
        visible: bool,
        x: i32,
        y: i32,
        layers: Vec<JsonLayer>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonTileset {
    pub columns: u32,
    pub image: String,
    pub imagewidth: u32,
    pub imageheight: u32,
    pub margin: u32,
    pub name: String,
    pub spacing: u32,
    pub tilecount: u32,
    pub tiledversion: String,
    pub tilewidth: u32,
    pub tileheight: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

/// The serde model of the map document.
#[must_use]
pub fn map_model(doc: &ExportDocument, config: &ExportConfig) -> JsonMap {
    JsonMap {
        compressionlevel: -1,
        width: doc.width,
        height: doc.height,
        infinite: false,
        layers: doc.layers.iter().map(|l| layer_model(doc, l)).collect(),
        nextlayerid: doc.next_layer_id,
        nextobjectid: 1,
        orientation: "orthogonal".into(),
        renderorder: "right-down".into(),
        tiledversion: config.tiled_version.clone(),
        tilewidth: doc.tile,
        tileheight: doc.tile,
        tilesets: doc
            .tilesets
            .iter()
            .map(|t| JsonTilesetRef {
                firstgid: t.firstgid,
                source: format!("{}.tsj", t.stem),
            })
            .collect(),
        kind: "map".into(),
        version: TILED_FORMAT_VERSION.into(),
    }
}

fn layer_model(doc: &ExportDocument, layer: &ExportLayer) -> JsonLayer {
    match layer {
        ExportLayer::Tiles {
            id,
            name,
            opacity,
            visible,
            data,
        } => JsonLayer::Tiles {
            id: *id,
            name: name.clone(),
            width: doc.width,
            height: doc.height,
            opacity: *opacity,
            visible: *visible,
            x: 0,
            y: 0,
            data: data.clone(),
        },
        ExportLayer::Group { id, name, layers } => JsonLayer::Group {
            id: *id,
            name: name.clone(),
            opacity: 1.0,
            visible: true,
            x: 0,
            y: 0,
            layers: layers.iter().map(|l| layer_model(doc, l)).collect(),
        },
    }
}

/// The serde model of one tileset document.
#[must_use]
pub fn tileset_model(ts: &TilesetRef, config: &ExportConfig) -> JsonTileset {
    JsonTileset {
        columns: ts.columns,
        image: format!("{}.png", ts.stem),
        imagewidth: ts.image_width,
        imageheight: ts.image_height,
        margin: 0,
        name: ts.name.clone(),
        spacing: 0,
        tilecount: ts.tilecount,
        tiledversion: config.tiled_version.clone(),
        tilewidth: ts.tile,
        tileheight: ts.tile,
        kind: "tileset".into(),
        version: TILED_FORMAT_VERSION.into(),
    }
}

pub fn write_map(doc: &ExportDocument, config: &ExportConfig) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(&map_model(doc, config))
}

pub fn write_tileset(ts: &TilesetRef, config: &ExportConfig) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(&tileset_model(ts, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc() -> ExportDocument {
        ExportDocument {
            width: 2,
            height: 2,
            tile: 8,
            tilesets: vec![TilesetRef {
                firstgid: 5,
                name: "rock".into(),
                stem: "rock".into(),
                tile: 8,
                columns: 2,
                tilecount: 4,
                image_width: 16,
                image_height: 16,
                file_id: "r".into(),
            }],
            layers: vec![
                ExportLayer::Tiles {
                    id: 1,
                    name: "base".into(),
                    opacity: 1.0,
                    visible: true,
                    data: vec![5, 0, 0, 8],
                },
                ExportLayer::Group {
                    id: 2,
                    name: "deco".into(),
                    layers: vec![],
                },
            ],
            next_layer_id: 3,
        }
    }

    #[test]
    fn map_json_shape() {
        let bytes = write_map(&doc(), &ExportConfig::default()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "map");
        assert_eq!(value["version"], "1.9");
        assert_eq!(value["nextlayerid"], 3);
        assert_eq!(value["tilesets"], json!([{ "firstgid": 5, "source": "rock.tsj" }]));
        assert_eq!(value["layers"][0]["type"], "tilelayer");
        assert_eq!(value["layers"][0]["data"], json!([5, 0, 0, 8]));
        assert_eq!(value["layers"][1]["type"], "group");
        assert_eq!(value["layers"][1]["layers"], json!([]));
    }

    #[test]
    fn map_json_reads_back() {
        let bytes = write_map(&doc(), &ExportConfig::default()).unwrap();
        let parsed: JsonMap = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, map_model(&doc(), &ExportConfig::default()));
    }

    #[test]
    fn tileset_json_shape() {
        let bytes = write_tileset(&doc().tilesets[0], &ExportConfig::default()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "tileset");
        assert_eq!(value["image"], "rock.png");
        assert_eq!(value["tilecount"], 4);
        assert_eq!(value["columns"], 2);
    }
}
