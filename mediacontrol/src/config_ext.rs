//! Coordinator settings read from `mediaconfig`.
//!
//! `ControlConfigExt` adds typed accessors to [`mediaconfig::Config`] so the
//! coordinators and engines never deal with raw YAML paths.
//!
//! ```rust,ignore
//! use mediaconfig::get_config;
//! use mediacontrol::ControlConfigExt;
//!
//! let config = get_config();
//! let options = config.local_playback_options()?;
//! ```

use std::time::Duration;

use anyhow::{Result, anyhow};
use mediaconfig::Config;

use crate::descriptor::MediaDescriptor;
use crate::local::LocalPlaybackOptions;
use crate::sim::SimulationOptions;

/// Where to reach a Chromecast receiver.
#[derive(Clone, Debug, PartialEq)]
pub struct ChromecastOptions {
    pub host: String,
    pub port: u16,
    /// Interval between two media status polls.
    pub status_poll_interval: Duration,
}

pub trait ControlConfigExt {
    /// Receiver application launched by `connect`.
    fn cast_application_id(&self) -> Result<String>;

    fn local_playback_options(&self) -> Result<LocalPlaybackOptions>;

    fn simulation_options(&self) -> Result<SimulationOptions>;

    /// Fails when no Chromecast host is configured.
    fn chromecast_options(&self) -> Result<ChromecastOptions>;

    /// Descriptors for the `demo.media` entries, in file order.
    fn demo_descriptors(&self) -> Result<Vec<MediaDescriptor>>;
}

impl ControlConfigExt for Config {
    fn cast_application_id(&self) -> Result<String> {
        self.get_cast_application_id()
    }

    fn local_playback_options(&self) -> Result<LocalPlaybackOptions> {
        let interval_ms = self.get_position_tick_interval_ms()?;
        let defaults = LocalPlaybackOptions::default();
        Ok(LocalPlaybackOptions {
            position_tick_interval: match interval_ms {
                0 => defaults.position_tick_interval,
                ms => Duration::from_millis(ms as u64),
            },
        })
    }

    fn simulation_options(&self) -> Result<SimulationOptions> {
        Ok(SimulationOptions {
            prepare_delay: Duration::from_millis(self.get_simulated_prepare_delay_ms()? as u64),
            request_delay: Duration::from_millis(self.get_simulated_request_delay_ms()? as u64),
        })
    }

    fn chromecast_options(&self) -> Result<ChromecastOptions> {
        let host = self
            .get_chromecast_host()
            .ok_or_else(|| anyhow!("cast.chromecast.host is not configured"))?;
        Ok(ChromecastOptions {
            host,
            port: self.get_chromecast_port(),
            status_poll_interval: Duration::from_millis(
                self.get_chromecast_status_poll_interval_ms()?.max(100) as u64,
            ),
        })
    }

    fn demo_descriptors(&self) -> Result<Vec<MediaDescriptor>> {
        self.get_demo_media()?
            .into_iter()
            .map(|entry| {
                let mut builder = MediaDescriptor::builder(entry.id, entry.url);
                if let Some(title) = entry.title {
                    builder = builder.title(title);
                }
                if let Some(subtitle) = entry.subtitle {
                    builder = builder.subtitle(subtitle);
                }
                if let Some(image) = entry.image {
                    builder = builder.image(image.url, image.width, image.height);
                }
                builder.build().map_err(anyhow::Error::from)
            })
            .collect()
    }
}
