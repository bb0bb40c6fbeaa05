//! Device pairing: the latest code from the bridge and its QR renderings.

use qrcode::render::{svg, unicode};
use qrcode::QrCode;
use tokio::sync::RwLock;

use crate::error::PairingError;
use crate::messaging::LifecycleEvent;

const SVG_MIN_DIMENSION: u32 = 256;

/// Scannable SVG for the `/qr` page.
pub fn render_svg(code: &str) -> Result<String, PairingError> {
    let qr = QrCode::new(code.as_bytes()).map_err(|e| PairingError::Encode(e.to_string()))?;
    Ok(qr
        .render::<svg::Color>()
        .min_dimensions(SVG_MIN_DIMENSION, SVG_MIN_DIMENSION)
        .build())
}

/// Half-block rendering for the log, readable on dark terminals.
pub fn render_terminal(code: &str) -> Result<String, PairingError> {
    let qr = QrCode::new(code.as_bytes()).map_err(|e| PairingError::Encode(e.to_string()))?;
    Ok(qr
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Latest pairing code, cleared once the transport reports `Connected`.
#[derive(Debug, Default)]
pub struct PairingState {
    code: RwLock<Option<String>>,
    connected: RwLock<bool>,
}

impl PairingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::PairingCode(code) => {
                tracing::info!("[PAIRING] Pairing code received. Visit /qr to scan.");
                match render_terminal(&code) {
                    Ok(qr) => tracing::info!("[PAIRING]\n{}", qr),
                    Err(e) => tracing::warn!("[PAIRING] {}", e),
                }
                *self.code.write().await = Some(code);
                *self.connected.write().await = false;
            }
            LifecycleEvent::Connected => {
                tracing::info!("[PAIRING] Messaging bridge connected.");
                *self.code.write().await = None;
                *self.connected.write().await = true;
            }
        }
    }

    pub async fn current_code(&self) -> Option<String> {
        self.code.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pairing_code_is_cleared_on_connect() {
        let pairing = PairingState::new();
        pairing
            .apply(LifecycleEvent::PairingCode("2@abc,def".into()))
            .await;
        assert_eq!(pairing.current_code().await.as_deref(), Some("2@abc,def"));
        assert!(!pairing.is_connected().await);

        pairing.apply(LifecycleEvent::Connected).await;
        assert_eq!(pairing.current_code().await, None);
        assert!(pairing.is_connected().await);
    }

    #[test]
    fn svg_rendering_is_a_standalone_image() {
        let svg = render_svg("2@Qm9vdHN0cmFw,aGVsbG8=,d29ybGQ=,1").unwrap();
        assert!(svg.contains("<svg"));
        assert!(!svg.contains("2@Qm9v"));
    }

    #[test]
    fn terminal_rendering_uses_half_blocks() {
        let text = render_terminal("2@abc,def").unwrap();
        assert!(text.lines().count() > 5);
        assert!(text.contains('▀') || text.contains('▄') || text.contains('█'));
    }

    #[test]
    fn oversized_codes_are_rejected() {
        let huge = "x".repeat(8000);
        assert!(matches!(render_svg(&huge), Err(PairingError::Encode(_))));
    }
}
