//! Expression evaluation
//!
//! Expressions from comments and `${...}` placeholders are evaluated by an
//! embedded Rhai engine. Each evaluation gets a fresh scope built from a
//! branch chain: the fields of every data item become variables (inner items
//! shadow outer ones), `root` is the root data and `item` the innermost
//! item.
//!
//! Besides Rhai's standard library the engine provides formatting helpers
//! that produce [`StyledText`] and [`ImageValue`] values:
//!
//! ```text
//! ${bold(customer.name)}
//! ${styled(total, #{ italic: true, color: "FF0000" })}
//! ${image("logo.png", 120, 40)}
//! ${join(tags, ", ")}
//! ```

use rhai::{Array, Dynamic, Engine, Map, Scope};

use crate::config::EvaluatorSettings;
use crate::error::{Result, StampError};

/// Character formatting requested by an expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    /// Hex RGB colour, e.g. `FF0000`
    pub color: Option<String>,
}

impl TextStyle {
    /// Whether no formatting is requested
    pub fn is_plain(&self) -> bool {
        *self == TextStyle::default()
    }
}

/// Text with character formatting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyledText {
    pub text: String,
    pub style: TextStyle,
}

impl StyledText {
    /// Wrap any value, keeping the formatting of an existing [`StyledText`]
    fn from_value(value: Dynamic) -> Self {
        if value.is::<StyledText>() {
            value.cast::<StyledText>()
        } else {
            StyledText {
                text: value.to_string(),
                style: TextStyle::default(),
            }
        }
    }
}

/// An image to embed, loaded from the file system when rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageValue {
    pub path: String,
    pub width_px: Option<i64>,
    pub height_px: Option<i64>,
}

/// Rhai engine configured for template expressions
pub struct Evaluator {
    engine: Engine,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator").finish_non_exhaustive()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(&EvaluatorSettings::default())
    }
}

impl Evaluator {
    /// Create an evaluator with the given limits
    pub fn new(settings: &EvaluatorSettings) -> Self {
        let mut engine = Engine::new();

        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(settings.max_call_levels);
        engine.set_max_operations(settings.max_operations);
        engine.set_max_string_size(settings.max_string_size);
        engine.set_max_array_size(settings.max_array_size);
        engine.set_max_map_size(settings.max_array_size);
        engine.set_fail_on_invalid_map_property(true);

        Self::register_helpers(&mut engine);

        Self { engine }
    }

    /// Register formatting helpers available to expressions
    fn register_helpers(engine: &mut Engine) {
        engine
            .register_type_with_name::<StyledText>("StyledText")
            .register_get("text", |styled: &mut StyledText| styled.text.clone())
            .register_fn("to_string", |styled: &mut StyledText| styled.text.clone());

        engine.register_fn("bold", |value: Dynamic| {
            let mut styled = StyledText::from_value(value);
            styled.style.bold = true;
            styled
        });
        engine.register_fn("italic", |value: Dynamic| {
            let mut styled = StyledText::from_value(value);
            styled.style.italic = true;
            styled
        });
        engine.register_fn("underline", |value: Dynamic| {
            let mut styled = StyledText::from_value(value);
            styled.style.underline = true;
            styled
        });
        engine.register_fn("styled", |value: Dynamic, options: Map| {
            let mut styled = StyledText::from_value(value);
            let flag = |key: &str| options.get(key).and_then(|v| v.as_bool().ok());
            if let Some(bold) = flag("bold") {
                styled.style.bold = bold;
            }
            if let Some(italic) = flag("italic") {
                styled.style.italic = italic;
            }
            if let Some(underline) = flag("underline") {
                styled.style.underline = underline;
            }
            if let Some(color) = options.get("color").filter(|v| !v.is_unit()) {
                styled.style.color = Some(color.to_string().trim_start_matches('#').to_string());
            }
            styled
        });

        engine
            .register_type_with_name::<ImageValue>("Image")
            .register_get("path", |image: &mut ImageValue| image.path.clone());
        engine.register_fn("image", |path: &str| ImageValue {
            path: path.to_string(),
            width_px: None,
            height_px: None,
        });
        engine.register_fn("image", |path: &str, width: i64, height: i64| ImageValue {
            path: path.to_string(),
            width_px: Some(width),
            height_px: Some(height),
        });

        engine.register_fn("join", |items: Array, separator: &str| -> String {
            items
                .iter()
                .map(|item| item.to_string())
                .collect::<Vec<_>>()
                .join(separator)
        });
        engine.register_fn("present", |value: Dynamic| !value.is_unit());
        engine.register_fn("or_else", |value: Dynamic, fallback: Dynamic| {
            if value.is_unit() {
                fallback
            } else {
                value
            }
        });
    }

    /// The underlying engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Mutable access for registering custom functions
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Convert JSON data into an evaluator value
    pub fn to_dynamic(data: &serde_json::Value) -> Result<Dynamic> {
        rhai::serde::to_dynamic(data)
            .map_err(|e| StampError::Config(format!("Failed to convert data: {}", e)))
    }

    /// Evaluate an expression against a branch chain (outermost first)
    ///
    /// Errors are returned as the reason text used by the unresolved policy.
    pub fn evaluate(
        &self,
        expression: &str,
        chain: &[Dynamic],
    ) -> std::result::Result<Dynamic, String> {
        let mut scope = Self::scope_for(chain);
        self.engine
            .eval_expression_with_scope::<Dynamic>(&mut scope, expression)
            .map_err(|e| e.to_string())
    }

    /// Build an evaluation scope from a branch chain
    fn scope_for(chain: &[Dynamic]) -> Scope<'static> {
        let mut scope = Scope::new();
        for layer in chain {
            if let Some(map) = layer.clone().try_cast::<Map>() {
                for (key, value) in map {
                    scope.push_constant_dynamic(key.to_string(), value);
                }
            }
        }
        if let Some(root) = chain.first() {
            scope.push_constant_dynamic("root", root.clone());
        }
        if chain.len() > 1 {
            if let Some(item) = chain.last() {
                scope.push_constant_dynamic("item", item.clone());
            }
        }
        scope
    }
}
