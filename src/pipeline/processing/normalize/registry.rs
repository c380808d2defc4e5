use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::parser::{
    GoogleParser, MetaParser, MetricsParser, SourceParser, TikTokParser,
};
use crate::types::{IntermediateTable, Platform};

/// Registry mapping each platform to its source parser
pub struct ParserRegistry {
    parsers: HashMap<Platform, Box<dyn SourceParser>>,
}

impl ParserRegistry {
    /// Create a registry with the built-in parsers, configured from `config`
    pub fn new(config: &Config) -> Self {
        let mut parsers: HashMap<Platform, Box<dyn SourceParser>> = HashMap::new();

        parsers.insert(Platform::Meta, Box::new(MetricsParser::new(MetaParser::new())));
        parsers.insert(
            Platform::Google,
            Box::new(MetricsParser::new(GoogleParser::new(&config.google))),
        );
        parsers.insert(
            Platform::TikTok,
            Box::new(MetricsParser::new(TikTokParser::new(&config.tiktok))),
        );

        Self { parsers }
    }

    /// Replace the parser for a platform
    pub fn register(&mut self, parser: Box<dyn SourceParser>) {
        self.parsers.insert(parser.platform(), parser);
    }

    pub fn get_parser(&self, platform: Platform) -> Option<&dyn SourceParser> {
        self.parsers.get(&platform).map(|p| p.as_ref())
    }

    pub fn parse(&self, platform: Platform, path: &Path) -> Result<IntermediateTable> {
        match self.get_parser(platform) {
            Some(parser) => parser.parse(path),
            None => Err(PipelineError::Config(format!(
                "No parser registered for platform: {}",
                platform
            ))),
        }
    }

    /// Registered platforms in source order
    pub fn list_platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.parsers.keys().copied().collect();
        platforms.sort();
        platforms
    }
}
