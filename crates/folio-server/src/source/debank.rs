//! EVM portfolios from the DeBank profile page.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use folio_core::{PortfolioSnapshot, Section, WalletAddress};

use super::raw::{self, RawPage};
use super::{ExtractionError, PageSettings, PortfolioSource, SourceId};
use crate::session::BrowserSession;

const PROJECT_SELECTOR: &str = "div[class*='ProjectTitle_projectTitle']";

const SCROLL_PAUSE: Duration = Duration::from_secs(2);

/// Wallet holdings come from the token card under the `#Wallet` title. Every
/// other title is a protocol whose element id starts with its chain tag, and
/// whose sections are the panel siblings that follow it.
const EXTRACT_SCRIPT: &str = r#"(() => {
  const text = (el) => (el && el.innerText ? el.innerText.trim() : '');
  const linkOf = (cell) => text(cell.querySelector("a[class*='detailLink']")) || text(cell);
  const rowsOf = (el) => Array.from(el.querySelectorAll("div[class*='table_contentRow']"));
  const rowAsset = (row) => {
    const c = Array.from(row.children);
    if (c.length < 3) return null;
    const n = c.length;
    return { token: linkOf(c[n - 3]), balance: text(c[n - 2]), value: text(c[n - 1]) };
  };
  const titles = Array.from(document.querySelectorAll("div[class*='ProjectTitle_projectTitle']"));
  const projects = [];

  const walletTitle = titles.find((t) => t.id === 'Wallet');
  if (walletTitle) {
    const assets = [];
    const card = document.querySelector("div[class*='TokenWallet_card']");
    if (card) {
      for (const row of card.querySelectorAll('div.db-table-wrappedRow')) {
        const c = row.querySelectorAll('div.db-table-cell');
        if (c.length >= 4) assets.push({ token: linkOf(c[0]), balance: text(c[2]), value: text(c[3]) });
      }
    }
    projects.push({
      name: 'Wallet',
      chain: 'evm',
      total_value: text(walletTitle.querySelector('div.projectTitle-number')) || null,
      sections: [{ label: 'Wallet', assets }],
    });
  }

  for (const title of titles) {
    if (title.id === 'Wallet') continue;
    const name = text(title.querySelector("span[class*='ProjectTitle_protocolLink']"))
      || text(title.querySelector("div[class*='ProjectTitle_name']"))
      || 'Unknown';
    const id = title.id || '';
    const sections = [];
    for (let panel = title.nextElementSibling; panel; panel = panel.nextElementSibling) {
      const cls = String(panel.className || '');
      if (cls.includes('ProjectTitle_projectTitle')) break;
      if (!cls.includes('Panel_container')) continue;
      const label = text(panel.querySelector("div[class*='BookMark_bookmark']"));
      if (!label) continue;
      if (label === 'Lending') {
        const section = { label, supplied: [], borrowed: [] };
        for (const header of panel.querySelectorAll("div[class*='table_header']")) {
          const heading = text(header).toLowerCase();
          const target = heading.includes('borrow') ? section.borrowed
            : heading.includes('suppl') ? section.supplied : null;
          if (!target || !header.parentElement) continue;
          for (const row of rowsOf(header.parentElement)) {
            const asset = rowAsset(row);
            if (asset) target.push(asset);
          }
        }
        sections.push(section);
      } else {
        sections.push({ label, assets: rowsOf(panel).map(rowAsset).filter(Boolean) });
      }
    }
    projects.push({
      name,
      chain: id.includes('_') ? id.split('_')[0] : 'evm',
      total_value: text(title.querySelector('div.projectTitle-number')) || null,
      sections,
    });
  }
  return { containers: titles.length, projects };
})()"#;

pub struct DebankSource {
    settings: PageSettings,
}

impl DebankSource {
    pub fn new(settings: PageSettings) -> Self {
        Self { settings }
    }

    pub fn profile_url(&self, wallet: &WalletAddress) -> String {
        format!("{}/profile/{}", self.settings.base_url, wallet)
    }
}

#[async_trait]
impl PortfolioSource for DebankSource {
    fn id(&self) -> SourceId {
        SourceId::Debank
    }

    async fn extract(
        &self,
        session: &dyn BrowserSession,
        wallet: &WalletAddress,
    ) -> Result<PortfolioSnapshot, ExtractionError> {
        let start = Instant::now();
        let url = self.profile_url(wallet);
        self.settings.open(session, &url, PROJECT_SELECTOR).await?;

        // Protocol panels render lazily as they scroll into view
        session.scroll_cycle(SCROLL_PAUSE).await?;

        let page = RawPage::decode(session.evaluate(EXTRACT_SCRIPT).await?)?;
        if page.containers == 0 {
            return Err(ExtractionError::NotFound(format!("no project titles on {}", url)));
        }

        let projects = raw::into_projects(page.projects, &self.chain().to_string(), self.settings.min_usd_value);
        tracing::info!(
            source = %SourceId::Debank,
            wallet = %wallet.short(),
            projects = projects.len(),
            assets = projects.iter().flat_map(|p| &p.sections).map(Section::asset_count).sum::<usize>(),
            duration_ms = %start.elapsed().as_millis(),
            "Extracted EVM portfolio"
        );
        Ok(PortfolioSnapshot::new(wallet.clone(), Utc::now(), projects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::ChainKind;
    use crate::session::testing::{profile, FakeLauncher};
    use crate::session::BrowserLauncher;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const WALLET: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

    fn source() -> DebankSource {
        DebankSource::new(PageSettings {
            base_url: "https://debank.com".to_string(),
            page_timeout: Duration::from_secs(30),
            interactive_wait: Duration::from_secs(120),
            settle: Duration::from_millis(0),
            min_usd_value: dec!(5),
        })
    }

    #[tokio::test]
    async fn test_wallet_and_protocol_projects() {
        let launcher = FakeLauncher::new();
        launcher.page.evaluations.lock().unwrap().push_back(Ok(json!({
            "containers": 2,
            "projects": [
                {"name": "Wallet", "chain": "evm", "total_value": "$3,210",
                 "sections": [{"label": "Wallet", "assets": [
                    {"token": "ETH", "balance": "1.2 ETH", "value": "$3,200"},
                    {"token": "SHIB", "balance": "10 SHIB", "value": "$0.0001"}
                 ]}]},
                {"name": "Aave V3", "chain": "arb", "total_value": null,
                 "sections": [{"label": "Lending",
                    "supplied": [{"token": "USDC", "balance": "5,000 USDC", "value": "$5,000"}],
                    "borrowed": [{"token": "WETH", "balance": "0.5 WETH", "value": "$1,500"}]}]}
            ]
        })));
        let session = launcher.launch(SourceId::Debank, &profile()).await.unwrap();
        let wallet = WalletAddress::parse(WALLET).unwrap();

        let snapshot = source().extract(session.as_ref(), &wallet).await.unwrap();

        assert_eq!(snapshot.chain, ChainKind::Evm);
        assert_eq!(snapshot.projects_count, 2);
        assert_eq!(snapshot.projects[0].total_value, dec!(3210));
        assert_eq!(snapshot.projects[0].sections[0].asset_count(), 1);
        assert_eq!(snapshot.projects[1].chain_tag, "arb");
        assert_eq!(snapshot.projects[1].total_value, dec!(3500));
        assert!(matches!(snapshot.projects[1].sections[0], Section::Lending { .. }));
        assert_eq!(
            launcher.page.visited.lock().unwrap().as_slice(),
            &[format!("https://debank.com/profile/{}", WALLET)]
        );
    }

    #[tokio::test]
    async fn test_empty_page_is_not_found() {
        let launcher = FakeLauncher::new();
        launcher
            .page
            .evaluations
            .lock()
            .unwrap()
            .push_back(Ok(json!({"containers": 0, "projects": []})));
        let session = launcher.launch(SourceId::Debank, &profile()).await.unwrap();
        let wallet = WalletAddress::parse(WALLET).unwrap();

        let err = source().extract(session.as_ref(), &wallet).await.unwrap_err();
        assert!(matches!(err, ExtractionError::NotFound(_)));
    }
}
