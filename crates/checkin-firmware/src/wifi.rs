//! WiFi station link
//!
//! Association is driven by the esp-radio controller; "up" additionally
//! requires a DHCP lease on the embassy-net stack.

use alloc::string::String;

use checkin_core::WirelessLink;
use checkin_core::config::NetworkCredentials;
use embassy_net::Stack;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiError};
use log::{debug, info};

pub struct EspWifiLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
}

impl EspWifiLink {
    /// Configure the controller as a station for `credentials`. Does not associate.
    pub fn new(
        mut controller: WifiController<'static>,
        stack: Stack<'static>,
        credentials: &NetworkCredentials<'_>,
    ) -> Result<Self, WifiError> {
        let client = ClientConfig::default()
            .with_ssid(String::from(credentials.ssid))
            .with_password(String::from(credentials.password));
        controller.set_config(&ModeConfig::Client(client))?;

        info!("WiFi station configured for SSID {}", credentials.ssid);
        Ok(Self { controller, stack })
    }
}

impl WirelessLink for EspWifiLink {
    type Error = WifiError;

    async fn associate(&mut self) -> Result<(), WifiError> {
        if !matches!(self.controller.is_started(), Ok(true)) {
            debug!("Starting WiFi driver");
            self.controller.start_async().await?;
        }
        self.controller.connect_async().await
    }

    fn is_up(&mut self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.stack.is_config_up()
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.controller.disconnect_async().await {
            debug!("WiFi disconnect failed: {:?}", e);
        }
    }
}
