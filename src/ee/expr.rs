//! Serialized Earth Engine expression graphs.
//!
//! The Earth Engine REST API evaluates a server-side computation described as
//! a tree of `functionInvocationValue` / `constantValue` nodes. This module
//! builds the handful of shapes the field-health pipeline needs: load an
//! image collection, filter it by bounds/date/property, order it, take the
//! first image, derive bands, and reduce over a region.
//!
//! Nodes are nested directly inside their parent's arguments; the top-level
//! `{"values": {"0": ...}, "result": "0"}` wrapper is produced by
//! [`Expr::into_expression`].

use serde_json::{json, Value};

use crate::aoi::BoundingBox;

/// One server-side value: an image, collection, filter, number, or
/// dictionary, depending on the functions applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(Value);

fn constant(value: Value) -> Value {
    json!({ "constantValue": value })
}

fn invoke(function: &str, arguments: Value) -> Value {
    json!({
        "functionInvocationValue": {
            "functionName": function,
            "arguments": arguments,
        }
    })
}

/// Load an image collection by asset id, e.g. `COPERNICUS/S2_SR_HARMONIZED`.
pub fn image_collection(id: &str) -> Expr {
    Expr(invoke("ImageCollection.load", json!({ "id": constant(json!(id)) })))
}

/// Load a single image asset, e.g. `projects/soilgrids-isric/soc_mean`.
pub fn image(id: &str) -> Expr {
    Expr(invoke("Image.load", json!({ "id": constant(json!(id)) })))
}

/// Axis-aligned lat/lon rectangle geometry.
pub fn bbox(bounds: &BoundingBox) -> Expr {
    Expr(invoke(
        "GeometryConstructors.BBox",
        json!({
            "west": constant(json!(bounds.west)),
            "south": constant(json!(bounds.south)),
            "east": constant(json!(bounds.east)),
            "north": constant(json!(bounds.north)),
        }),
    ))
}

impl Expr {
    /// Merge another image collection into this one.
    pub fn merge(self, other: Expr) -> Expr {
        Expr(invoke(
            "ImageCollection.merge",
            json!({ "collection1": self.0, "collection2": other.0 }),
        ))
    }

    /// Keep only images intersecting `geometry`.
    pub fn filter_bounds(self, geometry: &Expr) -> Expr {
        let filter = invoke("Filter.bounds", json!({ "geometry": geometry.0.clone() }));
        Expr(invoke(
            "Collection.filter",
            json!({ "collection": self.0, "filter": filter }),
        ))
    }

    /// Keep only images acquired in `[start_ms, end_ms)` (epoch millis).
    pub fn filter_date(self, start_ms: i64, end_ms: i64) -> Expr {
        let filter = invoke(
            "Filter.date",
            json!({
                "start": constant(json!(start_ms)),
                "end": constant(json!(end_ms)),
            }),
        );
        Expr(invoke(
            "Collection.filter",
            json!({ "collection": self.0, "filter": filter }),
        ))
    }

    /// Keep only images whose metadata property equals `value`.
    pub fn filter_eq(self, property: &str, value: Value) -> Expr {
        let filter = invoke(
            "Filter.equals",
            json!({
                "leftField": constant(json!(property)),
                "rightValue": constant(value),
            }),
        );
        Expr(invoke(
            "Collection.filter",
            json!({ "collection": self.0, "filter": filter }),
        ))
    }

    /// Keep only images whose list-valued property contains `value`.
    pub fn filter_list_contains(self, property: &str, value: Value) -> Expr {
        let filter = invoke(
            "Filter.listContains",
            json!({
                "leftField": constant(json!(property)),
                "rightValue": constant(value),
            }),
        );
        Expr(invoke(
            "Collection.filter",
            json!({ "collection": self.0, "filter": filter }),
        ))
    }

    /// Order the collection by a metadata property. The REST serialization
    /// of a sort is `Collection.limit` with a sort key and no count.
    pub fn sort(self, property: &str, ascending: bool) -> Expr {
        Expr(invoke(
            "Collection.limit",
            json!({
                "collection": self.0,
                "key": constant(json!(property)),
                "ascending": constant(json!(ascending)),
            }),
        ))
    }

    /// First image of the (ordered) collection.
    pub fn first(self) -> Expr {
        Expr(invoke("Collection.first", json!({ "collection": self.0 })))
    }

    /// Number of images in the collection.
    pub fn size(self) -> Expr {
        Expr(invoke("Collection.size", json!({ "collection": self.0 })))
    }

    /// Select a single band.
    pub fn select(self, band: &str) -> Expr {
        Expr(invoke(
            "Image.select",
            json!({
                "input": self.0,
                "bandSelectors": constant(json!([band])),
            }),
        ))
    }

    /// `(b1 - b2) / (b1 + b2)` over the named bands.
    pub fn normalized_difference(self, band1: &str, band2: &str) -> Expr {
        Expr(invoke(
            "Image.normalizedDifference",
            json!({
                "input": self.0,
                "bandNames": constant(json!([band1, band2])),
            }),
        ))
    }

    /// Rename the image's single band.
    pub fn rename(self, name: &str) -> Expr {
        Expr(invoke(
            "Image.rename",
            json!({
                "input": self.0,
                "names": constant(json!([name])),
            }),
        ))
    }

    pub fn multiply(self, value: f64) -> Expr {
        self.arith("Image.multiply", value)
    }

    pub fn add(self, value: f64) -> Expr {
        self.arith("Image.add", value)
    }

    pub fn subtract(self, value: f64) -> Expr {
        self.arith("Image.subtract", value)
    }

    fn arith(self, function: &str, value: f64) -> Expr {
        let operand = invoke("Image.constant", json!({ "value": constant(json!(value)) }));
        Expr(invoke(
            function,
            json!({ "image1": self.0, "image2": operand }),
        ))
    }

    /// Mean of the image's pixels over `geometry` at `scale` meters/pixel.
    /// Produces a dictionary keyed by band name.
    pub fn reduce_region_mean(self, geometry: &Expr, scale: f64) -> Expr {
        let reducer = invoke("Reducer.mean", json!({}));
        Expr(invoke(
            "Image.reduceRegion",
            json!({
                "image": self.0,
                "reducer": reducer,
                "geometry": geometry.0.clone(),
                "scale": constant(json!(scale)),
            }),
        ))
    }

    /// Look up a key in a server-side dictionary.
    pub fn get(self, key: &str) -> Expr {
        Expr(invoke(
            "Dictionary.get",
            json!({
                "dictionary": self.0,
                "key": constant(json!(key)),
            }),
        ))
    }

    /// Wrap the node into the REST `Expression` envelope.
    pub fn into_expression(self) -> Value {
        json!({
            "values": { "0": self.0 },
            "result": "0",
        })
    }
}
