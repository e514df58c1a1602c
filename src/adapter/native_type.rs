//! Parsers for what databases report about their own schema.
//!
//! ## Grammar
//! ```text
//! native_type = NAME [ "(" arg { "," arg } ")" ] [ "[]" ] { MODIFIER }
//! arg         = DIGITS | "'" text "'"
//! index_def   = "CREATE" ["UNIQUE"] "INDEX" ident "ON" qualified ["USING" NAME] "(" index_col { "," index_col } ")"
//! fk_clause   = "CONSTRAINT" ident "FOREIGN KEY" "(" ident { "," ident } ")"
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map, opt},
    error::{Error, ErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::error::{PhoenixError, PhoenixResult};
use crate::schema::{Column, ColumnType, DefaultValue, IndexColumn, IndexMethod, IndexType};

/// A native column type declaration such as `int(11) unsigned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeType {
    pub name: String,
    pub args: Vec<String>,
    pub array: bool,
    pub modifiers: Vec<String>,
}

impl NativeType {
    pub fn is_unsigned(&self) -> bool {
        self.modifiers.iter().any(|m| m == "unsigned")
    }

    fn numeric_arg(&self, at: usize) -> Option<u32> {
        self.args.get(at).and_then(|a| a.parse().ok())
    }
}

/// Abstract type plus the settings implied by a native declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub column_type: ColumnType,
    pub length: Option<u32>,
    pub decimals: Option<u32>,
    pub values: Vec<String>,
    pub signed: bool,
}

impl ColumnSpec {
    fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            length: None,
            decimals: None,
            values: Vec::new(),
            signed: true,
        }
    }

    /// Keep a length only when it differs from what builders emit by default.
    fn length(mut self, length: Option<u32>, default: u32) -> Self {
        self.length = length.filter(|l| *l != default);
        self
    }

    fn decimals(mut self, decimals: Option<u32>, default: u32) -> Self {
        self.decimals = decimals.filter(|d| *d != default);
        self
    }

    pub fn into_column(self, name: impl Into<String>) -> Column {
        let mut column = Column::new(name, self.column_type);
        column.settings.length = self.length;
        column.settings.decimals = self.decimals;
        column.settings.values = self.values;
        column.settings.signed = self.signed;
        column
    }
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

/// `'text'` with `''` as an escaped quote.
fn quoted(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('\'')(input)?;
    let mut out = String::new();
    loop {
        let Some(end) = rest.find('\'') else {
            return Err(nom::Err::Error(Error::new(rest, ErrorKind::Char)));
        };
        out.push_str(&rest[..end]);
        rest = &rest[end + 1..];
        match rest.strip_prefix('\'') {
            Some(after) => {
                out.push('\'');
                rest = after;
            }
            None => return Ok((rest, out)),
        }
    }
}

/// Identifier, bare or quoted with `"` or backticks.
fn identifier(input: &str) -> IResult<&str, String> {
    alt((
        map(delimited(char('"'), take_while1(|c: char| c != '"'), char('"')), String::from),
        map(delimited(char('`'), take_while1(|c: char| c != '`'), char('`')), String::from),
        map(word, String::from),
    ))(input)
}

fn argument(input: &str) -> IResult<&str, String> {
    alt((quoted, map(digit1, String::from)))(input)
}

fn native_type(input: &str) -> IResult<&str, NativeType> {
    let (input, _) = multispace0(input)?;
    let (input, name) = word(input)?;
    let (input, args) = opt(delimited(
        tuple((multispace0, char('('), multispace0)),
        separated_list1(comma, argument),
        tuple((multispace0, char(')'))),
    ))(input)?;
    let (input, array) = opt(tag("[]"))(input)?;
    let (input, modifiers) = many0(preceded(multispace1, word))(input)?;

    Ok((
        input,
        NativeType {
            name: name.to_lowercase(),
            args: args.unwrap_or_default(),
            array: array.is_some(),
            modifiers: modifiers.into_iter().map(str::to_lowercase).collect(),
        },
    ))
}

/// Parse a declaration like `decimal(10,2)` or `enum('a','b')`.
pub fn parse_native_type(declaration: &str) -> PhoenixResult<NativeType> {
    native_type(declaration)
        .map(|(_, parsed)| parsed)
        .map_err(|_| PhoenixError::invalid("native column type", declaration, &[]))
}

/// Column type of a MySQL `COLUMN_TYPE` or an SQLite declared type.
pub fn column_spec(native: &NativeType) -> PhoenixResult<ColumnSpec> {
    let length = native.numeric_arg(0);
    let spec = match native.name.as_str() {
        "tinyint" if length == Some(1) => ColumnSpec::new(ColumnType::Boolean),
        "boolean" | "bool" => ColumnSpec::new(ColumnType::Boolean),
        "tinyint" => ColumnSpec::new(ColumnType::TinyInteger).length(length, 4),
        "smallint" => ColumnSpec::new(ColumnType::SmallInteger).length(length, 6),
        "mediumint" => ColumnSpec::new(ColumnType::MediumInteger).length(length, 9),
        "int" | "integer" => ColumnSpec::new(ColumnType::Integer).length(length, 11),
        "bigint" => ColumnSpec::new(ColumnType::BigInteger).length(length, 20),
        "varchar" => ColumnSpec::new(ColumnType::String).length(length, 255),
        "char" => ColumnSpec::new(ColumnType::Char).length(length, 255),
        "text" | "clob" => ColumnSpec::new(ColumnType::Text),
        "tinytext" => ColumnSpec::new(ColumnType::TinyText),
        "mediumtext" => ColumnSpec::new(ColumnType::MediumText),
        "longtext" => ColumnSpec::new(ColumnType::LongText),
        "json" => ColumnSpec::new(ColumnType::Json),
        "decimal" | "numeric" => {
            let column_type = if native.name == "decimal" { ColumnType::Decimal } else { ColumnType::Numeric };
            ColumnSpec::new(column_type)
                .length(length, 10)
                .decimals(native.numeric_arg(1), 0)
        }
        "float" | "real" | "double" => {
            let column_type = if native.name == "float" { ColumnType::Float } else { ColumnType::Double };
            let mut spec = ColumnSpec::new(column_type);
            spec.length = length;
            spec.decimals = native.numeric_arg(1);
            spec
        }
        "date" => ColumnSpec::new(ColumnType::Date),
        "time" => ColumnSpec::new(ColumnType::Time),
        "datetime" => ColumnSpec::new(ColumnType::DateTime),
        "timestamp" => ColumnSpec::new(ColumnType::Timestamp),
        "year" => ColumnSpec::new(ColumnType::Year),
        "binary" => ColumnSpec::new(ColumnType::Binary).length(length, 255),
        "varbinary" => ColumnSpec::new(ColumnType::VarBinary).length(length, 255),
        "blob" => ColumnSpec::new(ColumnType::Blob),
        "tinyblob" => ColumnSpec::new(ColumnType::TinyBlob),
        "mediumblob" => ColumnSpec::new(ColumnType::MediumBlob),
        "longblob" => ColumnSpec::new(ColumnType::LongBlob),
        "bit" => ColumnSpec::new(ColumnType::Bit).length(length, 32),
        "enum" | "set" => {
            let column_type = if native.name == "enum" { ColumnType::Enum } else { ColumnType::Set };
            let mut spec = ColumnSpec::new(column_type);
            spec.values = native.args.clone();
            spec
        }
        "point" => ColumnSpec::new(ColumnType::Point),
        "linestring" => ColumnSpec::new(ColumnType::Line),
        "polygon" => ColumnSpec::new(ColumnType::Polygon),
        other => return Err(PhoenixError::invalid("native column type", other, &[])),
    };

    Ok(ColumnSpec {
        signed: !(native.is_unsigned() && spec.column_type.is_numeric()),
        ..spec
    })
}

/// Column type of a PostgreSQL `udt_name` with its size columns.
pub fn pgsql_column_spec(
    udt_name: &str,
    length: Option<u32>,
    precision: Option<u32>,
    scale: Option<u32>,
) -> PhoenixResult<ColumnSpec> {
    let spec = match udt_name {
        "int2" => ColumnSpec::new(ColumnType::SmallInteger),
        "int4" => ColumnSpec::new(ColumnType::Integer),
        "int8" => ColumnSpec::new(ColumnType::BigInteger),
        "bool" => ColumnSpec::new(ColumnType::Boolean),
        "varchar" => ColumnSpec::new(ColumnType::String).length(length, 255),
        "bpchar" => ColumnSpec::new(ColumnType::Char).length(length, 255),
        "text" => ColumnSpec::new(ColumnType::Text),
        "json" | "jsonb" => ColumnSpec::new(ColumnType::Json),
        "uuid" => ColumnSpec::new(ColumnType::Uuid),
        "numeric" => ColumnSpec::new(ColumnType::Decimal)
            .length(precision, 10)
            .decimals(scale, 0),
        "float4" => ColumnSpec::new(ColumnType::Float),
        "float8" => ColumnSpec::new(ColumnType::Double),
        "date" => ColumnSpec::new(ColumnType::Date),
        "time" => ColumnSpec::new(ColumnType::Time),
        "timestamp" | "timestamptz" => ColumnSpec::new(ColumnType::DateTime),
        "bytea" => ColumnSpec::new(ColumnType::Blob),
        "bit" | "varbit" => ColumnSpec::new(ColumnType::Bit).length(length, 32),
        "_varchar" => ColumnSpec::new(ColumnType::Set),
        "point" => ColumnSpec::new(ColumnType::Point),
        "line" => ColumnSpec::new(ColumnType::Line),
        "polygon" => ColumnSpec::new(ColumnType::Polygon),
        other => return Err(PhoenixError::invalid("native column type", other, &[])),
    };
    Ok(spec)
}

fn cast_suffix(input: &str) -> IResult<&str, ()> {
    let (input, _) = many0(preceded(tag("::"), take_while1(|c: char| c != ':')))(input)?;
    Ok((input, ()))
}

/// Default of an SQLite or PostgreSQL column, given as SQL text.
///
/// PostgreSQL sequence defaults (`nextval(..)`) yield `None`; they belong to
/// autoincrement columns.
pub fn parse_sql_default(raw: &str, column_type: ColumnType) -> Option<DefaultValue> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("null") || raw.starts_with("nextval(") {
        return None;
    }
    if let Ok((rest, text)) = quoted(raw)
        && let Ok(("", ())) = cast_suffix(rest)
    {
        return Some(typed_default(&text, column_type, true));
    }
    let unwrapped = raw.trim_start_matches('(').trim_end_matches(')');
    Some(typed_default(unwrapped, column_type, false))
}

/// Default reported by MySQL's `information_schema`, which strips quotes.
pub fn parse_mysql_default(raw: &str, column_type: ColumnType) -> DefaultValue {
    if column_type.is_textual() || column_type.is_enumerated() {
        return DefaultValue::String(raw.to_string());
    }
    typed_default(raw, column_type, false)
}

fn typed_default(text: &str, column_type: ColumnType, quoted: bool) -> DefaultValue {
    if column_type == ColumnType::Boolean {
        match text.to_lowercase().as_str() {
            "1" | "true" | "t" => return DefaultValue::Bool(true),
            "0" | "false" | "f" => return DefaultValue::Bool(false),
            _ => {}
        }
    }
    if column_type.is_integer()
        && let Ok(i) = text.parse::<i64>()
    {
        return DefaultValue::Integer(i);
    }
    if quoted {
        DefaultValue::String(text.to_string())
    } else if let Ok(i) = text.parse::<i64>() {
        DefaultValue::Integer(i)
    } else {
        DefaultValue::Raw(text.to_string())
    }
}

/// A parsed PostgreSQL `pg_indexes.indexdef`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub kind: IndexType,
    pub method: IndexMethod,
    pub columns: Vec<IndexColumn>,
}

fn index_column(input: &str) -> IResult<&str, IndexColumn> {
    let (input, name) = identifier(input)?;
    let (input, desc) = opt(preceded(multispace1, tag_no_case("DESC")))(input)?;
    let (input, _) = opt(preceded(multispace1, tag_no_case("ASC")))(input)?;
    let column = IndexColumn::new(name);
    Ok((input, if desc.is_some() { column.desc() } else { column }))
}

fn index_definition(input: &str) -> IResult<&str, IndexDefinition> {
    let (input, _) = tuple((tag_no_case("CREATE"), multispace1))(input)?;
    let (input, unique) = opt(tuple((tag_no_case("UNIQUE"), multispace1)))(input)?;
    let (input, _) = tuple((tag_no_case("INDEX"), multispace1))(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = tuple((multispace1, tag_no_case("ON"), multispace1))(input)?;
    let (input, _) = tuple((opt(tuple((tag_no_case("ONLY"), multispace1))), identifier))(input)?;
    let (input, _) = opt(preceded(char('.'), identifier))(input)?;
    let (input, method) = opt(preceded(
        tuple((multispace1, tag_no_case("USING"), multispace1)),
        word,
    ))(input)?;
    let (input, columns) = delimited(
        tuple((multispace0, char('('))),
        separated_list1(comma, index_column),
        char(')'),
    )(input)?;

    let method = match method.map(str::to_lowercase).as_deref() {
        Some("hash") => IndexMethod::Hash,
        _ => IndexMethod::Default,
    };
    Ok((
        input,
        IndexDefinition {
            name,
            kind: if unique.is_some() { IndexType::Unique } else { IndexType::Normal },
            method,
            columns,
        },
    ))
}

/// Parse `CREATE [UNIQUE] INDEX name ON [schema.]table USING method (cols)`.
pub fn parse_index_definition(definition: &str) -> PhoenixResult<IndexDefinition> {
    index_definition(definition.trim())
        .map(|(_, parsed)| parsed)
        .map_err(|_| PhoenixError::invalid("index definition", definition, &[]))
}

fn foreign_key_clause(input: &str) -> IResult<&str, (String, Vec<String>)> {
    let (input, _) = tuple((tag_no_case("CONSTRAINT"), multispace1))(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = tuple((
        multispace1,
        tag_no_case("FOREIGN"),
        multispace1,
        tag_no_case("KEY"),
        multispace0,
        char('('),
        multispace0,
    ))(input)?;
    let (input, columns) = separated_list1(comma, identifier)(input)?;
    let (input, _) = tuple((multispace0, char(')')))(input)?;
    Ok((input, (name, columns)))
}

/// Named foreign keys declared in a `CREATE TABLE` statement, as
/// `(name, local columns)`.
pub fn foreign_key_names(create_sql: &str) -> Vec<(String, Vec<String>)> {
    let mut found = Vec::new();
    let mut rest = create_sql;
    while let Some(at) = rest.find("CONSTRAINT") {
        rest = &rest[at..];
        match foreign_key_clause(rest) {
            Ok((after, clause)) => {
                found.push(clause);
                rest = after;
            }
            Err(_) => rest = &rest["CONSTRAINT".len()..],
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mysql_types() {
        let native = parse_native_type("int(10) unsigned").unwrap();
        assert_eq!(native.name, "int");
        assert_eq!(native.args, vec!["10"]);
        assert!(native.is_unsigned());

        let spec = column_spec(&native).unwrap();
        assert_eq!(spec.column_type, ColumnType::Integer);
        assert_eq!(spec.length, Some(10));
        assert!(!spec.signed);

        let spec = column_spec(&parse_native_type("int(11)").unwrap()).unwrap();
        assert_eq!(spec.length, None);

        let spec = column_spec(&parse_native_type("decimal(8,2)").unwrap()).unwrap();
        assert_eq!((spec.column_type, spec.length, spec.decimals), (ColumnType::Decimal, Some(8), Some(2)));

        let spec = column_spec(&parse_native_type("tinyint(1)").unwrap()).unwrap();
        assert_eq!(spec.column_type, ColumnType::Boolean);
    }

    #[test]
    fn test_parse_enum_values() {
        let native = parse_native_type("enum('new','it''s', 'done')").unwrap();
        assert_eq!(native.args, vec!["new", "it's", "done"]);
        let spec = column_spec(&native).unwrap();
        assert_eq!(spec.column_type, ColumnType::Enum);
        assert_eq!(spec.values, vec!["new", "it's", "done"]);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let native = parse_native_type("geometrycollection").unwrap();
        assert!(matches!(column_spec(&native), Err(PhoenixError::InvalidArgumentValue { .. })));
        assert!(pgsql_column_spec("tsvector", None, None, None).is_err());
    }

    #[test]
    fn test_parse_sql_defaults() {
        assert_eq!(
            parse_sql_default("'it''s'::character varying", ColumnType::String),
            Some(DefaultValue::String("it's".into()))
        );
        assert_eq!(parse_sql_default("0", ColumnType::Integer), Some(DefaultValue::Integer(0)));
        assert_eq!(parse_sql_default("1", ColumnType::Boolean), Some(DefaultValue::Bool(true)));
        assert_eq!(parse_sql_default("false", ColumnType::Boolean), Some(DefaultValue::Bool(false)));
        assert_eq!(
            parse_sql_default("CURRENT_TIMESTAMP", ColumnType::Timestamp),
            Some(DefaultValue::Raw("CURRENT_TIMESTAMP".into()))
        );
        assert_eq!(parse_sql_default("nextval('users_id_seq'::regclass)", ColumnType::Integer), None);
        assert_eq!(parse_sql_default("NULL", ColumnType::Text), None);
    }

    #[test]
    fn test_parse_mysql_default() {
        assert_eq!(parse_mysql_default("draft", ColumnType::Enum), DefaultValue::String("draft".into()));
        assert_eq!(parse_mysql_default("0", ColumnType::Boolean), DefaultValue::Bool(false));
        assert_eq!(parse_mysql_default("42", ColumnType::BigInteger), DefaultValue::Integer(42));
    }

    #[test]
    fn test_parse_index_definition() {
        let parsed = parse_index_definition(
            "CREATE UNIQUE INDEX idx_users_email ON public.users USING btree (email, \"Created At\" DESC)",
        )
        .unwrap();
        assert_eq!(parsed.name, "idx_users_email");
        assert_eq!(parsed.kind, IndexType::Unique);
        assert_eq!(parsed.method, IndexMethod::Default);
        assert_eq!(parsed.columns[0], IndexColumn::new("email"));
        assert_eq!(parsed.columns[1], IndexColumn::new("Created At").desc());

        let parsed = parse_index_definition("CREATE INDEX lookup ON users USING hash (token)").unwrap();
        assert_eq!(parsed.method, IndexMethod::Hash);
        assert_eq!(parsed.kind, IndexType::Normal);
    }

    #[test]
    fn test_foreign_key_names() {
        let sql = "CREATE TABLE \"posts\" (\"id\" integer,\"a\" integer,\"b\" integer,\
CONSTRAINT \"posts_author\" FOREIGN KEY (\"a\",\"b\") REFERENCES \"authors\" (\"x\",\"y\"))";
        assert_eq!(
            foreign_key_names(sql),
            vec![("posts_author".to_string(), vec!["a".to_string(), "b".to_string()])]
        );
    }
}
