use crate::cgi::{CgiEnvironment, CgiHandler};
use crate::error::GatewayError;
use crate::options::{Options, RequestContext};
use crate::proxy_url::ProxyUrl;
use crate::render;
use crate::response::{parse_response, CgiResult};
use crate::rewrite::{rewrite_document, EMBEDDED_MARKER};

/// A single CGI invocation and its processed output.
///
/// Construction runs the script; everything afterwards reads the stored
/// result.
pub struct Gateway {
    options: Options,
    env: CgiEnvironment,
    result: CgiResult,
    document: Option<String>,
    embedded: bool,
    lenient: bool,
}

impl Gateway {
    pub fn new(options: Options, context: &RequestContext) -> Result<Self, GatewayError> {
        Self::with_interpreter(options, context, None, true)
    }

    pub fn with_interpreter(
        mut options: Options,
        context: &RequestContext,
        interpreter: Option<String>,
        lenient: bool,
    ) -> Result<Self, GatewayError> {
        options.apply_href(context.param("href"));
        options.validate()?;

        let env = CgiEnvironment::build(&options, context);
        let script = options.script_filename.clone().unwrap_or_default();
        let output = CgiHandler::new(script, interpreter).execute(&env)?;

        let embedded = [options.request_uri.as_deref(), context.var("REQUEST_URI")]
            .into_iter()
            .flatten()
            .any(|uri| uri.contains(EMBEDDED_MARKER));

        let mut gateway = Gateway {
            result: parse_response(&output, options.filter.as_ref())?,
            options,
            env,
            document: None,
            embedded,
            lenient,
        };
        gateway.rewrite()?;
        Ok(gateway)
    }

    fn rewrite(&mut self) -> Result<(), GatewayError> {
        if !self.result.is_html() || (self.result.body.is_empty() && self.result.header.is_empty()) {
            return Ok(());
        }

        let proxy = ProxyUrl::from_options(&self.options);
        match rewrite_document(
            &self.result.body,
            &proxy,
            self.options.path_info(),
            self.options.get.as_deref(),
        ) {
            Ok(html) => {
                self.result.body = html;
            }
            Err(e) if self.lenient => {
                log::warn!("keeping unrewritten body: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
        self.document = Some(self.result.body.clone());
        Ok(())
    }

    pub fn body(&self) -> &str {
        &self.result.body
    }

    /// Body bytes exactly as the script produced them.
    pub fn raw_body(&self) -> &[u8] {
        &self.result.raw_body
    }

    pub fn header(&self) -> &str {
        &self.result.header
    }

    pub fn content_type(&self) -> &str {
        &self.result.content_type
    }

    pub fn env(&self) -> String {
        self.env.to_string()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Content type the host must send itself: set only for non-HTML
    /// output fetched directly through an embedded link.
    pub fn response_content_type(&self) -> Option<&str> {
        (self.embedded && !self.result.is_html()).then_some(self.result.content_type.as_str())
    }

    /// Markup for embedding in a host page.
    ///
    /// `highlight_rows` is ignored for annotate and raw-text views.
    pub fn div(&self, highlight_rows: bool) -> Result<String, GatewayError> {
        let highlight =
            highlight_rows && !render::suppresses_highlight(self.options.query_string.as_deref());
        match render::div(&self.result, self.document.as_deref(), highlight) {
            Ok(div) => Ok(div),
            Err(e) if self.lenient => {
                log::warn!("rendering body as is: {}", e);
                Ok(format!("{}{}</div>", render::WRAPPER_OPEN, self.result.body))
            }
            Err(e) => Err(e.into()),
        }
    }
}
