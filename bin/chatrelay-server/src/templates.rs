//! Embedded HTML page templates.

use minijinja::Environment;
use serde::Serialize;

pub const CHAT: &str = "chat.html";
pub const IMAGE: &str = "image.html";

const SOURCES: [(&str, &str); 2] = [
    (CHAT, include_str!("../templates/chat.html")),
    (IMAGE, include_str!("../templates/image.html")),
];

/// Compiled page templates.  `.html` templates are auto-escaped.
#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for (name, source) in SOURCES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }

    /// Registered template names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        SOURCES.iter().map(|(name, _)| *name)
    }
}

#[cfg(test)]
mod test {
    use minijinja::context;

    use super::*;

    #[test]
    fn all_templates_compile() {
        let templates = Templates::new().unwrap();
        assert_eq!(templates.names().collect::<Vec<_>>(), vec![CHAT, IMAGE]);
    }

    #[test]
    fn message_content_is_escaped() {
        let templates = Templates::new().unwrap();
        let html = templates
            .render(
                CHAT,
                context! {
                    session_id => "s-1",
                    messages => vec![context! { role => "user", content => "<script>x</script>" }],
                },
            )
            .unwrap();
        assert!(html.contains("&lt;script&gt;x"));
        assert!(!html.contains("<script>x"));
    }

    #[test]
    fn image_page_shows_generated_url() {
        let templates = Templates::new().unwrap();
        let html = templates
            .render(IMAGE, context! { prompt => "a cat", image_url => "https://img.example/cat.png" })
            .unwrap();
        assert!(html.contains("<img"));
        assert!(html.contains("cat.png"));
    }
}
