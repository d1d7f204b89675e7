use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::error::MysqlPluginError;
use crate::executor::Session;
use crate::results::{Row, column_i64, column_str, scan_rows};
use crate::types::SqlValue;

/// Routines of the active schema with their parameters, one row per parameter.
///
/// Routines without parameters still produce one row (with NULL parameter columns)
/// thanks to the left join. Ordinal 0 carries a function's return type.
pub const CATALOG_QUERY: &str = "SELECT r.ROUTINE_NAME AS ROUTINE_NAME, \
r.ROUTINE_TYPE AS ROUTINE_TYPE, p.PARAMETER_NAME AS PARAMETER_NAME, p.DATA_TYPE AS DATA_TYPE, \
p.PARAMETER_MODE AS PARAMETER_MODE, p.ORDINAL_POSITION AS ORDINAL_POSITION \
FROM information_schema.ROUTINES r \
LEFT JOIN information_schema.PARAMETERS p \
ON p.SPECIFIC_SCHEMA = r.ROUTINE_SCHEMA AND p.SPECIFIC_NAME = r.SPECIFIC_NAME \
WHERE r.ROUTINE_SCHEMA = DATABASE() \
ORDER BY r.ROUTINE_NAME, r.ROUTINE_TYPE, p.ORDINAL_POSITION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoutineType {
    Function,
    Procedure,
}

impl RoutineType {
    fn from_engine(kind: Option<&str>, name: &str) -> Result<Self, MysqlPluginError> {
        match kind.map(str::trim) {
            Some(k) if k.eq_ignore_ascii_case("FUNCTION") => Ok(Self::Function),
            Some(k) if k.eq_ignore_ascii_case("PROCEDURE") => Ok(Self::Procedure),
            other => Err(MysqlPluginError::CatalogError(format!(
                "routine {name} has unknown type {}",
                other.unwrap_or("NULL")
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterMode {
    In,
    InOut,
    Out,
}

impl ParameterMode {
    /// Parse the engine's `PARAMETER_MODE`; an unspecified mode is `IN`.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::CatalogError` for an unknown mode.
    pub fn from_engine(mode: Option<&str>) -> Result<Self, MysqlPluginError> {
        match mode.map(str::trim) {
            None | Some("") => Ok(Self::In),
            Some(m) if m.eq_ignore_ascii_case("IN") => Ok(Self::In),
            Some(m) if m.eq_ignore_ascii_case("INOUT") => Ok(Self::InOut),
            Some(m) if m.eq_ignore_ascii_case("OUT") => Ok(Self::Out),
            Some(other) => Err(MysqlPluginError::CatalogError(format!(
                "unknown parameter mode {other}"
            ))),
        }
    }

    #[must_use]
    pub fn is_input(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }
}

/// One declared input parameter of a routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineParameter {
    pub name: String,
    pub data_type: String,
    pub mode: ParameterMode,
    /// 1-based position in the routine signature.
    pub ordinal: u32,
}

/// A stored function or procedure. Functions have a `return_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineInfo {
    pub name: String,
    /// Input parameters (IN and INOUT), in ordinal order.
    pub params: Vec<RoutineParameter>,
    pub return_type: Option<String>,
}

impl RoutineInfo {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: None,
        }
    }

    #[must_use]
    pub fn is_function(&self) -> bool {
        self.return_type.is_some()
    }

    /// Bind caller arguments to the declared parameters in ordinal order.
    ///
    /// Argument names match parameter names case-insensitively. Every parameter
    /// must be supplied and no other argument may be present.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::ValidationError` naming the first missing
    /// parameter or the first unexpected argument.
    pub fn bind_arguments(
        &self,
        args: &Map<String, JsonValue>,
    ) -> Result<Vec<SqlValue>, MysqlPluginError> {
        let mut ordered: Vec<&RoutineParameter> = self.params.iter().collect();
        ordered.sort_by_key(|p| p.ordinal);

        let mut bound = Vec::with_capacity(ordered.len());
        for param in &ordered {
            let value = args
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(&param.name))
                .map(|(_, value)| value)
                .ok_or_else(|| {
                    MysqlPluginError::ValidationError(format!(
                        "missing required argument: {}",
                        param.name
                    ))
                })?;
            bound.push(SqlValue::from_json(value));
        }

        if let Some(extra) = args
            .keys()
            .find(|key| !ordered.iter().any(|p| p.name.eq_ignore_ascii_case(key)))
        {
            return Err(MysqlPluginError::ValidationError(format!(
                "unexpected argument: {extra}"
            )));
        }
        Ok(bound)
    }
}

/// Routines keyed by exact name.
///
/// Functions and procedures live in separate namespaces, as they do in MySQL.
/// When both kinds share a name, lookups by name resolve to the function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutineCatalog {
    functions: BTreeMap<String, RoutineInfo>,
    procedures: BTreeMap<String, RoutineInfo>,
}

impl RoutineCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a routine; one with a `return_type` is filed as a function.
    pub fn insert(&mut self, routine: RoutineInfo) {
        let namespace = if routine.is_function() {
            &mut self.functions
        } else {
            &mut self.procedures
        };
        namespace.insert(routine.name.clone(), routine);
    }

    /// The routine `call_function` reaches under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RoutineInfo> {
        self.functions
            .get(name)
            .or_else(|| self.procedures.get(name))
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&RoutineInfo> {
        self.functions.get(name)
    }

    #[must_use]
    pub fn procedure(&self, name: &str) -> Option<&RoutineInfo> {
        self.procedures.get(name)
    }

    /// Number of routines of both kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len() + self.procedures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.procedures.is_empty()
    }

    /// Routines reachable by name, in name order. A procedure shadowed by a
    /// function of the same name is skipped.
    pub fn iter(&self) -> impl Iterator<Item = &RoutineInfo> {
        let mut visible: BTreeMap<&str, &RoutineInfo> = self
            .procedures
            .iter()
            .map(|(name, routine)| (name.as_str(), routine))
            .collect();
        visible.extend(self.functions.iter().map(|(name, routine)| (name.as_str(), routine)));
        visible.into_values()
    }

    /// Build a catalog from rows shaped like [`CATALOG_QUERY`]'s output.
    ///
    /// # Errors
    /// Returns `MysqlPluginError::CatalogError` for rows without a routine name, an
    /// unknown routine type, an input parameter without a name, an unknown mode,
    /// or two parameters of one routine whose names differ only by case.
    pub fn from_rows(rows: &[Row]) -> Result<Self, MysqlPluginError> {
        let mut catalog = Self::new();
        for row in rows {
            let name = column_str(row, "ROUTINE_NAME")
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    MysqlPluginError::CatalogError("routine row without ROUTINE_NAME".into())
                })?;
            let kind = RoutineType::from_engine(column_str(row, "ROUTINE_TYPE"), name)?;
            let namespace = match kind {
                RoutineType::Function => &mut catalog.functions,
                RoutineType::Procedure => &mut catalog.procedures,
            };
            let routine = namespace
                .entry(name.to_string())
                .or_insert_with(|| RoutineInfo::new(name));

            let Some(ordinal) = column_i64(row, "ORDINAL_POSITION") else {
                continue;
            };
            let data_type = column_str(row, "DATA_TYPE").unwrap_or_default().to_string();
            if ordinal == 0 {
                if kind == RoutineType::Function {
                    routine.return_type = Some(data_type);
                }
                continue;
            }

            let mode = ParameterMode::from_engine(column_str(row, "PARAMETER_MODE"))?;
            if !mode.is_input() {
                continue;
            }
            let param_name = column_str(row, "PARAMETER_NAME")
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    MysqlPluginError::CatalogError(format!(
                        "routine {name} has an unnamed parameter at position {ordinal}"
                    ))
                })?;
            if routine
                .params
                .iter()
                .any(|p| p.name.eq_ignore_ascii_case(param_name))
            {
                return Err(MysqlPluginError::CatalogError(format!(
                    "routine {name} declares parameter {param_name} more than once (names are matched case-insensitively)"
                )));
            }
            let ordinal = u32::try_from(ordinal).map_err(|_| {
                MysqlPluginError::CatalogError(format!(
                    "routine {name} has invalid parameter position {ordinal}"
                ))
            })?;
            routine.params.push(RoutineParameter {
                name: param_name.to_string(),
                data_type,
                mode,
                ordinal,
            });
        }

        for routine in catalog.procedures.values_mut() {
            routine.params.sort_by_key(|p| p.ordinal);
        }
        for routine in catalog.functions.values_mut() {
            routine.params.sort_by_key(|p| p.ordinal);
            // Every MySQL function reports its return type at ordinal 0.
            if routine.return_type.is_none() {
                return Err(MysqlPluginError::CatalogError(format!(
                    "function {} has no return type",
                    routine.name
                )));
            }
            if catalog.procedures.contains_key(&routine.name) {
                tracing::debug!(routine = %routine.name, "function and procedure share a name; calls resolve to the function");
            }
        }
        Ok(catalog)
    }
}

/// Load the routine catalog of the active schema.
///
/// # Errors
/// Returns `MysqlPluginError::CatalogError` if the metadata query fails or its rows
/// do not form a consistent catalog. No partial catalog is returned.
pub async fn load_routines<S: Session + ?Sized>(
    session: &mut S,
) -> Result<RoutineCatalog, MysqlPluginError> {
    let mut cursor = session
        .query(CATALOG_QUERY, &[])
        .await
        .map_err(|e| MysqlPluginError::CatalogError(format!("failed to query routines: {e}")))?;
    let rows = scan_rows(&mut cursor)
        .map_err(|e| MysqlPluginError::CatalogError(format!("failed to scan routine row: {e}")))?;
    let catalog = RoutineCatalog::from_rows(&rows)?;
    tracing::info!(routines = catalog.len(), "loaded routine catalog");
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(name: &str, param: JsonValue, data_type: &str, mode: JsonValue, ordinal: JsonValue) -> Row {
        let kind = if name.starts_with("fn") { "FUNCTION" } else { "PROCEDURE" };
        typed_row(name, kind, param, data_type, mode, ordinal)
    }

    fn typed_row(
        name: &str,
        kind: &str,
        param: JsonValue,
        data_type: &str,
        mode: JsonValue,
        ordinal: JsonValue,
    ) -> Row {
        json!({
            "ROUTINE_NAME": name,
            "ROUTINE_TYPE": kind,
            "PARAMETER_NAME": param,
            "DATA_TYPE": data_type,
            "PARAMETER_MODE": mode,
            "ORDINAL_POSITION": ordinal,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn builds_functions_and_procedures() {
        let rows = vec![
            row("doSomething", json!("jsonParam"), "varchar", json!("IN"), json!(1)),
            row("doSomething", json!("outParam"), "int", json!("OUT"), json!(2)),
            row("fnName", json!(null), "varchar", json!(null), json!(0)),
            row("fnName", json!("p"), "varchar", json!(null), json!(1)),
            row("noArgs", json!(null), "", json!(null), json!(null)),
        ];
        let catalog = RoutineCatalog::from_rows(&rows).unwrap();
        assert_eq!(catalog.len(), 3);

        let proc_info = catalog.get("doSomething").unwrap();
        assert!(!proc_info.is_function());
        assert_eq!(proc_info.params.len(), 1);
        assert_eq!(proc_info.params[0].name, "jsonParam");

        let func = catalog.get("fnName").unwrap();
        assert_eq!(func.return_type.as_deref(), Some("varchar"));
        assert_eq!(func.params[0].mode, ParameterMode::In);

        let no_args = catalog.get("noArgs").unwrap();
        assert!(no_args.params.is_empty());
        assert!(!no_args.is_function());

        let names: Vec<&str> = catalog.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["doSomething", "fnName", "noArgs"]);
    }

    #[test]
    fn case_duplicate_parameters_are_rejected() {
        let rows = vec![
            row("r", json!("Id"), "int", json!("IN"), json!(1)),
            row("r", json!("ID"), "int", json!("IN"), json!(2)),
        ];
        let err = RoutineCatalog::from_rows(&rows).unwrap_err();
        assert!(matches!(err, MysqlPluginError::CatalogError(_)));
    }

    #[test]
    fn function_and_procedure_may_share_a_name() {
        let rows = vec![
            typed_row("foo", "FUNCTION", json!(null), "int", json!(null), json!(0)),
            typed_row("foo", "FUNCTION", json!("x"), "int", json!(null), json!(1)),
            typed_row("foo", "PROCEDURE", json!("x"), "int", json!("IN"), json!(1)),
            typed_row("foo", "PROCEDURE", json!("y"), "int", json!("IN"), json!(2)),
        ];
        let catalog = RoutineCatalog::from_rows(&rows).unwrap();
        assert_eq!(catalog.len(), 2);

        let func = catalog.function("foo").unwrap();
        assert_eq!(func.return_type.as_deref(), Some("int"));
        assert_eq!(func.params.len(), 1);

        let proc_info = catalog.procedure("foo").unwrap();
        assert!(!proc_info.is_function());
        assert_eq!(proc_info.params.len(), 2);

        assert_eq!(catalog.get("foo"), Some(func));
        assert_eq!(catalog.iter().count(), 1);
    }

    #[test]
    fn unknown_routine_type_is_rejected() {
        let rows = vec![typed_row("foo", "TRIGGER", json!(null), "", json!(null), json!(null))];
        assert_eq!(
            RoutineCatalog::from_rows(&rows).unwrap_err().to_string(),
            "Routine catalog error: routine foo has unknown type TRIGGER"
        );
    }

    #[test]
    fn binding_follows_ordinals_and_validates_names() {
        let mut info = RoutineInfo::new("r");
        info.params = vec![
            RoutineParameter {
                name: "b".into(),
                data_type: "int".into(),
                mode: ParameterMode::In,
                ordinal: 2,
            },
            RoutineParameter {
                name: "a".into(),
                data_type: "varchar".into(),
                mode: ParameterMode::InOut,
                ordinal: 1,
            },
        ];

        let args = json!({"B": 2, "a": "x"}).as_object().cloned().unwrap();
        assert_eq!(
            info.bind_arguments(&args).unwrap(),
            vec![SqlValue::from("x"), SqlValue::Int(2)]
        );

        let missing = json!({"a": "x"}).as_object().cloned().unwrap();
        assert_eq!(
            info.bind_arguments(&missing).unwrap_err().to_string(),
            "Validation error: missing required argument: b"
        );

        let extra = json!({"a": "x", "b": 1, "c": 0}).as_object().cloned().unwrap();
        assert_eq!(
            info.bind_arguments(&extra).unwrap_err().to_string(),
            "Validation error: unexpected argument: c"
        );
    }
}
