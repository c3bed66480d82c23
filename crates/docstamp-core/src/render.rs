//! Conversion of evaluated values into document content

use std::path::Path;

use docstamp_ooxml::media::{px_to_emu, sniff_extension, DEFAULT_HEIGHT_EMU, DEFAULT_WIDTH_EMU};
use docstamp_ooxml::WordPackage;
use rhai::{Array, Dynamic};

use crate::config::StampConfig;
use crate::eval::{ImageValue, StyledText, TextStyle};

/// One piece of rich content inserted into a paragraph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Text with formatting merged over the surrounding run's formatting
    Text { text: String, style: TextStyle },
    /// `w:br`
    Break,
    /// Inline picture referencing an image relationship
    Drawing { rel_id: String, cx: i64, cy: i64 },
}

/// Rendered form of a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Plain text, spliced into the existing runs
    Text(String),
    /// Content that needs runs of its own
    Rich(Vec<Fragment>),
}

impl Rendered {
    /// Content as fragments
    pub fn into_fragments(self) -> Vec<Fragment> {
        match self {
            Rendered::Text(text) => vec![Fragment::Text {
                text,
                style: TextStyle::default(),
            }],
            Rendered::Rich(fragments) => fragments,
        }
    }

    /// Visible text, with breaks as newlines and drawings dropped
    pub fn plain_text(&self) -> String {
        match self {
            Rendered::Text(text) => text.clone(),
            Rendered::Rich(fragments) => fragments
                .iter()
                .map(|fragment| match fragment {
                    Fragment::Text { text, .. } => text.as_str(),
                    Fragment::Break => "\n",
                    Fragment::Drawing { .. } => "",
                })
                .collect(),
        }
    }
}

/// Renders values, storing images in the package when one is available
pub struct Renderer<'a> {
    config: &'a StampConfig,
    media: Option<&'a mut WordPackage>,
}

impl<'a> Renderer<'a> {
    /// Renderer for the main document, able to embed images
    pub fn new(config: &'a StampConfig, media: Option<&'a mut WordPackage>) -> Self {
        Self { config, media }
    }

    /// Render a value; `Err` holds the reason the value is unusable
    pub fn render(&mut self, value: Dynamic) -> Result<Rendered, String> {
        if value.is_unit() {
            return if self.config.replace_null_values {
                Ok(Rendered::Text(self.config.null_default.clone()))
            } else {
                Err("expression evaluated to null".to_string())
            };
        }

        if value.is::<StyledText>() {
            let styled = value.cast::<StyledText>();
            if styled.style.is_plain() {
                return Ok(self.text(styled.text));
            }
            return Ok(Rendered::Rich(self.split_breaks(&styled.text, &styled.style)));
        }

        if value.is::<ImageValue>() {
            let image = value.cast::<ImageValue>();
            return Ok(Rendered::Rich(vec![self.image(&image)?]));
        }

        if value.is_array() {
            let items = value.cast::<Array>();
            let mut fragments = Vec::new();
            for item in items {
                if item.is_unit() {
                    continue;
                }
                fragments.extend(self.render(item)?.into_fragments());
            }
            return Ok(Rendered::Rich(fragments));
        }

        Ok(self.text(value.to_string()))
    }

    fn text(&self, text: String) -> Rendered {
        let token = &self.config.line_break_placeholder;
        if !token.is_empty() && text.contains(token.as_str()) {
            Rendered::Rich(self.split_breaks(&text, &TextStyle::default()))
        } else {
            Rendered::Text(text)
        }
    }

    fn split_breaks(&self, text: &str, style: &TextStyle) -> Vec<Fragment> {
        let token = &self.config.line_break_placeholder;
        let pieces: Vec<&str> = if token.is_empty() {
            vec![text]
        } else {
            text.split(token.as_str()).collect()
        };

        let mut fragments = Vec::new();
        for (index, piece) in pieces.into_iter().enumerate() {
            if index > 0 {
                fragments.push(Fragment::Break);
            }
            if !piece.is_empty() {
                fragments.push(Fragment::Text {
                    text: piece.to_string(),
                    style: style.clone(),
                });
            }
        }
        fragments
    }

    fn image(&mut self, image: &ImageValue) -> Result<Fragment, String> {
        let Some(package) = self.media.as_deref_mut() else {
            return Err("images are only supported in the document body".to_string());
        };
        let bytes = std::fs::read(&image.path)
            .map_err(|e| format!("cannot read image '{}': {}", image.path, e))?;
        let extension = Path::new(&image.path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string)
            .or_else(|| sniff_extension(&bytes).map(str::to_string))
            .ok_or_else(|| format!("unknown image format: '{}'", image.path))?;

        let rel_id = package.add_media(&bytes, &extension);
        let (cx, cy) = match (image.width_px, image.height_px) {
            (Some(width), Some(height)) => (px_to_emu(width), px_to_emu(height)),
            _ => (DEFAULT_WIDTH_EMU, DEFAULT_HEIGHT_EMU),
        };
        Ok(Fragment::Drawing { rel_id, cx, cy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstamp_ooxml::test_utils::{paragraph, DocxBuilder};

    fn render(value: Dynamic, config: &StampConfig) -> Result<Rendered, String> {
        Renderer::new(config, None).render(value)
    }

    fn text(text: &str) -> Fragment {
        Fragment::Text {
            text: text.to_string(),
            style: TextStyle::default(),
        }
    }

    #[test]
    fn test_scalars_render_as_text() {
        let config = StampConfig::default();
        assert_eq!(render(Dynamic::from(42_i64), &config), Ok(Rendered::Text("42".into())));
        assert_eq!(render(Dynamic::from(true), &config), Ok(Rendered::Text("true".into())));
        assert_eq!(render(Dynamic::from("x"), &config), Ok(Rendered::Text("x".into())));
    }

    #[test]
    fn test_null_policy() {
        let mut config = StampConfig::default();
        assert!(render(Dynamic::UNIT, &config).is_err());

        config.replace_null_values = true;
        config.null_default = "n/a".to_string();
        assert_eq!(render(Dynamic::UNIT, &config), Ok(Rendered::Text("n/a".into())));
    }

    #[test]
    fn test_line_breaks() {
        let config = StampConfig::default();
        let rendered = render(Dynamic::from("a\nb"), &config).unwrap();
        assert_eq!(rendered, Rendered::Rich(vec![text("a"), Fragment::Break, text("b")]));
        assert_eq!(rendered.plain_text(), "a\nb");
    }

    #[test]
    fn test_custom_line_break_token() {
        let config = StampConfig {
            line_break_placeholder: "<br>".to_string(),
            ..StampConfig::default()
        };
        let rendered = render(Dynamic::from("a<br>b"), &config).unwrap();
        assert_eq!(rendered, Rendered::Rich(vec![text("a"), Fragment::Break, text("b")]));
    }

    #[test]
    fn test_styled_text() {
        let config = StampConfig::default();
        let styled = StyledText {
            text: "x".to_string(),
            style: TextStyle {
                bold: true,
                ..TextStyle::default()
            },
        };
        let rendered = render(Dynamic::from(styled.clone()), &config).unwrap();
        assert_eq!(
            rendered,
            Rendered::Rich(vec![Fragment::Text {
                text: "x".to_string(),
                style: styled.style,
            }])
        );
    }

    #[test]
    fn test_arrays_concatenate() {
        let config = StampConfig::default();
        let items: Array = vec![Dynamic::from("a"), Dynamic::UNIT, Dynamic::from(1_i64)];
        let rendered = render(Dynamic::from_array(items), &config).unwrap();
        assert_eq!(rendered.plain_text(), "a1");
    }

    #[test]
    fn test_images_need_a_package() {
        let config = StampConfig::default();
        let image = ImageValue {
            path: "logo.png".to_string(),
            width_px: None,
            height_px: None,
        };
        assert!(render(Dynamic::from(image), &config).is_err());
    }

    #[test]
    fn test_image_is_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.bin");
        std::fs::write(&path, [0x89, b'P', b'N', b'G', 0, 1]).unwrap();

        let config = StampConfig::default();
        let mut package =
            WordPackage::from_bytes(&DocxBuilder::new(paragraph("x")).build()).unwrap();
        let image = ImageValue {
            path: path.to_string_lossy().into_owned(),
            width_px: Some(10),
            height_px: Some(20),
        };

        let rendered = Renderer::new(&config, Some(&mut package))
            .render(Dynamic::from(image))
            .unwrap();
        let Rendered::Rich(fragments) = rendered else {
            panic!("expected rich content");
        };
        let Fragment::Drawing { rel_id, cx, cy } = &fragments[0] else {
            panic!("expected a drawing");
        };
        assert_eq!((*cx, *cy), (95250, 190500));
        let (media_path, _) = package.media(rel_id).unwrap();
        assert!(media_path.ends_with(".bin"));
    }
}
