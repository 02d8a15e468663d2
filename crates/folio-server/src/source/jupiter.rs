//! Solana portfolios from the Jupiter portfolio page.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use folio_core::{PortfolioSnapshot, Section, WalletAddress};

use super::raw::{self, RawPage};
use super::{ExtractionError, PageSettings, PortfolioSource, SourceId};
use crate::session::BrowserSession;

const PROJECT_SELECTOR: &str = "details.platform-detail";

/// Walks `details.platform-detail` blocks. The first open block is the wallet
/// summary and "Holdings" repeats plain balances; both are skipped.
const EXTRACT_SCRIPT: &str = r#"(() => {
  const text = (el) => (el && el.innerText ? el.innerText.trim() : '');
  const rowsOf = (body) => (body ? Array.from(body.querySelectorAll('tr.transition-colors')) : []);
  const tokenOf = (cell) => text(cell.querySelector('p.text-sm')) || text(cell).split('\n')[0] || 'Unknown';
  const details = Array.from(document.querySelectorAll('details.platform-detail'));
  const projects = [];
  let summarySkipped = false;
  for (const detail of details) {
    if (!summarySkipped && detail.getAttribute('open') === '') {
      summarySkipped = true;
      continue;
    }
    const name = text(detail.querySelector('summary p'));
    if (!name || name.toLowerCase() === 'holdings') continue;
    const sections = [];
    for (const inner of detail.querySelectorAll('details.group\\/inner')) {
      const summary = inner.querySelector('summary');
      const table = inner.querySelector('table');
      if (!summary || !table) continue;
      const label = text(summary).split('\n')[0];
      if (text(summary).toLowerCase().includes('lending')) {
        const market = text(summary.querySelector('div.flex.flex-row.items-center.text-sm p'))
          || text(summary.querySelector('p.max-sm\\:hidden'))
          || 'Unknown Market';
        const section = { label: 'Lending', market, supplied: [], borrowed: [] };
        const bodies = Array.from(table.querySelectorAll('tbody'));
        let index = 0;
        for (const head of table.querySelectorAll('thead')) {
          const heading = text(head).toLowerCase();
          const target = heading.includes('supplied') ? section.supplied
            : heading.includes('borrowed') ? section.borrowed : null;
          if (!target) continue;
          for (const row of rowsOf(bodies[index])) {
            const c = row.querySelectorAll('td');
            if (c.length >= 5) {
              target.push({ token: tokenOf(c[0]), balance: text(c[1]), apy: text(c[3].querySelector('span')), value: text(c[4]) });
            }
          }
          index += 1;
        }
        sections.push(section);
      } else {
        const farming = label.toLowerCase().includes('farming');
        const assets = [];
        for (const row of rowsOf(table.querySelector('tbody'))) {
          const c = row.querySelectorAll('td');
          if (c.length >= 4) {
            assets.push({
              token: tokenOf(c[0]),
              balance: text(c[1]),
              apy: farming ? text(c[2].querySelector('span')) : null,
              value: text(c[3]),
            });
          }
        }
        sections.push({ label, assets });
      }
    }
    projects.push({ name, chain: 'solana', total_value: null, sections });
  }
  return { containers: details.length, projects };
})()"#;

pub struct JupiterSource {
    settings: PageSettings,
}

impl JupiterSource {
    pub fn new(settings: PageSettings) -> Self {
        Self { settings }
    }

    pub fn portfolio_url(&self, wallet: &WalletAddress) -> String {
        format!("{}/portfolio/{}", self.settings.base_url, wallet)
    }
}

#[async_trait]
impl PortfolioSource for JupiterSource {
    fn id(&self) -> SourceId {
        SourceId::Jupiter
    }

    async fn extract(
        &self,
        session: &dyn BrowserSession,
        wallet: &WalletAddress,
    ) -> Result<PortfolioSnapshot, ExtractionError> {
        let start = Instant::now();
        let url = self.portfolio_url(wallet);
        self.settings.open(session, &url, PROJECT_SELECTOR).await?;

        let page = RawPage::decode(session.evaluate(EXTRACT_SCRIPT).await?)?;
        if page.containers == 0 {
            return Err(ExtractionError::NotFound(format!("no {} on {}", PROJECT_SELECTOR, url)));
        }

        let projects = raw::into_projects(page.projects, &self.chain().to_string(), self.settings.min_usd_value);
        tracing::info!(
            source = %SourceId::Jupiter,
            wallet = %wallet.short(),
            projects = projects.len(),
            assets = projects.iter().flat_map(|p| &p.sections).map(Section::asset_count).sum::<usize>(),
            duration_ms = %start.elapsed().as_millis(),
            "Extracted Solana portfolio"
        );
        Ok(PortfolioSnapshot::new(wallet.clone(), Utc::now(), projects))
    }
}
