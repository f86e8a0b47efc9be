//! Catalog type model
//!
//! Every value flowing out of the catalog is described by a [`Type`]. Types are
//! keyed by their catalog OID, which is stable only within one catalog
//! database, so resolved types must never be shared across databases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog object identifier (`pg_type.oid`, `pg_class.oid`, ...)
pub type Oid = u32;

/// Catalog kind of a type, mirroring `pg_type.typtype`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Base (scalar) type, including array types
    Base,

    /// Composite (row) type
    Composite,

    /// Domain over another type
    Domain,

    /// Enum type
    Enum,

    /// Pseudo type such as `void` or `record`
    Pseudo,

    /// Range type
    Range,

    /// Multirange type
    Multirange,
}

impl TypeKind {
    /// Parse a `pg_type.typtype` code
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'b' => Some(Self::Base),
            'c' => Some(Self::Composite),
            'd' => Some(Self::Domain),
            'e' => Some(Self::Enum),
            'p' => Some(Self::Pseudo),
            'r' => Some(Self::Range),
            'm' => Some(Self::Multirange),
            _ => None,
        }
    }

    /// The `pg_type.typtype` code for this kind
    pub fn code(&self) -> char {
        match self {
            Self::Base => 'b',
            Self::Composite => 'c',
            Self::Domain => 'd',
            Self::Enum => 'e',
            Self::Pseudo => 'p',
            Self::Range => 'r',
            Self::Multirange => 'm',
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A scalar type with no further structure
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseType {
    pub oid: Oid,
    pub name: String,
}

impl BaseType {
    pub fn new(oid: Oid, name: impl Into<String>) -> Self {
        Self { oid, name: name.into() }
    }
}

/// An array of some element type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayType {
    pub oid: Oid,

    /// Catalog name, conventionally the element name prefixed with `_`
    pub name: String,

    pub elem: Box<Type>,
}

/// An enum type with its labels in sort order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    pub oid: Oid,
    pub name: String,

    /// Labels ordered by `enumsortorder`
    pub labels: Vec<String>,

    /// `pg_enum.enumsortorder` for each label
    pub sort_orders: Vec<f32>,

    /// `pg_enum.oid` for each label
    pub child_oids: Vec<Oid>,
}

/// A user-declared constrained alias over a base type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainType {
    pub oid: Oid,
    pub name: String,

    /// Domain carries a NOT NULL constraint
    pub not_null: bool,

    /// Domain declares a default expression
    pub has_default: bool,

    /// Underlying type
    pub base: BaseType,

    /// Array dimensions when the domain is over an array type, 0 otherwise
    pub dimensions: i32,
}

/// A row type with named, typed fields
///
/// `column_types[i]` is always a fully resolved type; composite resolution
/// therefore depends on its children resolving first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeType {
    pub oid: Oid,
    pub name: String,
    pub column_names: Vec<String>,
    pub column_types: Vec<Type>,
}

/// A type the resolver does not classify further
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownType {
    pub oid: Oid,
    pub name: String,
    pub kind: TypeKind,
}

/// A resolved catalog type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Type {
    Base(BaseType),
    Array(ArrayType),
    Enum(EnumType),
    Domain(DomainType),
    Composite(CompositeType),
    Unknown(UnknownType),

    /// The `void` pseudo type; filtered out before reaching code generation
    Void,
}

impl Type {
    /// Catalog OID of this type
    pub fn oid(&self) -> Oid {
        match self {
            Self::Base(t) => t.oid,
            Self::Array(t) => t.oid,
            Self::Enum(t) => t.oid,
            Self::Domain(t) => t.oid,
            Self::Composite(t) => t.oid,
            Self::Unknown(t) => t.oid,
            Self::Void => oid::VOID,
        }
    }

    /// Catalog name of this type
    pub fn name(&self) -> &str {
        match self {
            Self::Base(t) => &t.name,
            Self::Array(t) => &t.name,
            Self::Enum(t) => &t.name,
            Self::Domain(t) => &t.name,
            Self::Composite(t) => &t.name,
            Self::Unknown(t) => &t.name,
            Self::Void => "void",
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Shorthand for a base type
    pub fn base(oid: Oid, name: impl Into<String>) -> Self {
        Self::Base(BaseType::new(oid, name))
    }

    /// Shorthand for an array type
    pub fn array(oid: Oid, name: impl Into<String>, elem: Type) -> Self {
        Self::Array(ArrayType {
            oid,
            name: name.into(),
            elem: Box::new(elem),
        })
    }

    /// The `text` built-in
    pub fn text() -> Self {
        Self::base(oid::TEXT, "text")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array(t) => write!(f, "{}[]", t.elem),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Key of a table column: owning relation and attribute number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    /// `pg_class.oid` of the owning relation
    pub table_oid: Oid,

    /// `pg_attribute.attnum` (1-based)
    pub order: i16,
}

impl ColumnKey {
    pub fn new(table_oid: Oid, order: i16) -> Self {
        Self { table_oid, order }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table_oid, self.order)
    }
}

/// A table column with its resolved type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub table_oid: Oid,
    pub table_name: String,
    pub order: i16,
    pub ty: Type,

    /// False when the column carries a NOT NULL constraint
    pub nullable: bool,
}

impl Column {
    pub fn key(&self) -> ColumnKey {
        ColumnKey::new(self.table_oid, self.order)
    }
}

/// OIDs of built-in types that are stable across every PostgreSQL install
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const CHAR: Oid = 18;
    pub const NAME: Oid = 19;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const JSON: Oid = 114;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const BPCHAR: Oid = 1042;
    pub const VARCHAR: Oid = 1043;
    pub const DATE: Oid = 1082;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const NUMERIC: Oid = 1700;
    pub const VOID: Oid = 2278;
    pub const UUID: Oid = 2950;
    pub const JSONB: Oid = 3802;
    pub const INT4_ARRAY: Oid = 1007;
    pub const TEXT_ARRAY: Oid = 1009;
}

const KNOWN_BASE_TYPES: &[(Oid, &str)] = &[
    (16, "bool"),
    (17, "bytea"),
    (18, "char"),
    (19, "name"),
    (20, "int8"),
    (21, "int2"),
    (23, "int4"),
    (24, "regproc"),
    (25, "text"),
    (26, "oid"),
    (27, "tid"),
    (28, "xid"),
    (29, "cid"),
    (114, "json"),
    (142, "xml"),
    (600, "point"),
    (601, "lseg"),
    (602, "path"),
    (603, "box"),
    (604, "polygon"),
    (628, "line"),
    (650, "cidr"),
    (700, "float4"),
    (701, "float8"),
    (718, "circle"),
    (774, "macaddr8"),
    (790, "money"),
    (829, "macaddr"),
    (869, "inet"),
    (1042, "bpchar"),
    (1043, "varchar"),
    (1082, "date"),
    (1083, "time"),
    (1114, "timestamp"),
    (1184, "timestamptz"),
    (1186, "interval"),
    (1266, "timetz"),
    (1560, "bit"),
    (1562, "varbit"),
    (1700, "numeric"),
    (2205, "regclass"),
    (2206, "regtype"),
    (2950, "uuid"),
    (3614, "tsvector"),
    (3615, "tsquery"),
    (3802, "jsonb"),
    (3904, "int4range"),
    (3906, "numrange"),
    (3908, "tsrange"),
    (3910, "tstzrange"),
    (3912, "daterange"),
    (3926, "int8range"),
];

/// (array oid, array name, element oid)
const KNOWN_ARRAY_TYPES: &[(Oid, &str, Oid)] = &[
    (143, "_xml", 142),
    (199, "_json", 114),
    (651, "_cidr", 650),
    (1000, "_bool", 16),
    (1001, "_bytea", 17),
    (1002, "_char", 18),
    (1003, "_name", 19),
    (1005, "_int2", 21),
    (1007, "_int4", 23),
    (1009, "_text", 25),
    (1014, "_bpchar", 1042),
    (1015, "_varchar", 1043),
    (1016, "_int8", 20),
    (1021, "_float4", 700),
    (1022, "_float8", 701),
    (1028, "_oid", 26),
    (1040, "_macaddr", 829),
    (1041, "_inet", 869),
    (1115, "_timestamp", 1114),
    (1182, "_date", 1082),
    (1183, "_time", 1083),
    (1185, "_timestamptz", 1184),
    (1187, "_interval", 1186),
    (1231, "_numeric", 1700),
    (2951, "_uuid", 2950),
    (3807, "_jsonb", 3802),
];

/// Look up a well-known built-in type by OID
pub fn known_type(oid: Oid) -> Option<Type> {
    if oid == oid::VOID {
        return Some(Type::Void);
    }

    if let Some((_, name)) = KNOWN_BASE_TYPES.iter().find(|(o, _)| *o == oid) {
        return Some(Type::base(oid, *name));
    }

    KNOWN_ARRAY_TYPES
        .iter()
        .find(|(o, _, _)| *o == oid)
        .and_then(|(_, name, elem)| known_type(*elem).map(|e| Type::array(oid, *name, e)))
}

/// All well-known built-in types, used to pre-seed type caches
pub fn known_types() -> Vec<Type> {
    let mut types: Vec<Type> = KNOWN_BASE_TYPES
        .iter()
        .map(|(oid, name)| Type::base(*oid, *name))
        .collect();

    types.extend(
        KNOWN_ARRAY_TYPES
            .iter()
            .filter_map(|(oid, _, _)| known_type(*oid)),
    );
    types.push(Type::Void);
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_array_resolves_element() {
        let int4s = known_type(oid::INT4_ARRAY).unwrap();
        match &int4s {
            Type::Array(arr) => {
                assert_eq!(arr.name, "_int4");
                assert_eq!(*arr.elem, Type::base(oid::INT4, "int4"));
            }
            other => panic!("expected array, got {:?}", other),
        }
        assert_eq!(int4s.to_string(), "int4[]");
    }

    #[test]
    fn void_is_known() {
        assert_eq!(known_type(oid::VOID), Some(Type::Void));
        assert_eq!(Type::Void.oid(), oid::VOID);
        assert!(known_type(424242).is_none());
    }

    #[test]
    fn known_types_have_unique_oids() {
        let types = known_types();
        let mut oids: Vec<Oid> = types.iter().map(Type::oid).collect();
        oids.sort_unstable();
        oids.dedup();
        assert_eq!(oids.len(), types.len());
    }

    #[test]
    fn type_kind_codes() {
        for code in ['b', 'c', 'd', 'e', 'p', 'r', 'm'] {
            assert_eq!(TypeKind::from_code(code).unwrap().code(), code);
        }
        assert!(TypeKind::from_code('x').is_none());
    }

    #[test]
    fn type_serialization_is_tagged() {
        let json = serde_json::to_string(&Type::text()).unwrap();
        assert!(json.contains("\"type\":\"base\""));
        assert!(json.contains("\"name\":\"text\""));
    }

    #[test]
    fn unknown_type_keeps_variant_and_kind() {
        let range = Type::Unknown(UnknownType {
            oid: 90010,
            name: "r".to_string(),
            kind: TypeKind::Range,
        });
        let value = serde_json::to_value(&range).unwrap();
        assert_eq!(value["type"], "unknown");
        assert_eq!(value["kind"], "range");
    }

    #[test]
    fn every_variant_reads_back() {
        let text = Type::text();
        let types = vec![
            text.clone(),
            Type::array(oid::TEXT_ARRAY, "_text", text.clone()),
            Type::Enum(EnumType {
                oid: 90000,
                name: "mood".to_string(),
                labels: vec!["sad".to_string(), "happy".to_string()],
                sort_orders: vec![1.0, 2.0],
                child_oids: vec![90001, 90002],
            }),
            Type::Domain(DomainType {
                oid: 90020,
                name: "email".to_string(),
                not_null: true,
                has_default: false,
                base: BaseType::new(oid::TEXT, "text"),
                dimensions: 0,
            }),
            Type::Composite(CompositeType {
                oid: 90030,
                name: "pair".to_string(),
                column_names: vec!["label".to_string()],
                column_types: vec![text],
            }),
            Type::Unknown(UnknownType {
                oid: 90010,
                name: "r".to_string(),
                kind: TypeKind::Range,
            }),
            Type::Void,
        ];

        for ty in types {
            let json = serde_json::to_string(&ty).unwrap();
            let back: Type = serde_json::from_str(&json).unwrap();
            assert_eq!(back, ty, "{}", json);
        }
    }
}
