//! Câmara Municipal do Recife news listing.

use enquete_shared::FetchedItem;
use scraper::{Html, Selector};
use url::Url;

use super::{PortalAdapter, headline, resolve_href};

/// Attribution used for every Câmara item; the listing carries no per-item author.
pub const CAMARA_AUTHOR: &str = "Câmara Municipal do Recife";

/// Extracts `article.news-item` blocks with an `h4.title a` headline link.
pub struct CamaraAdapter;

impl PortalAdapter for CamaraAdapter {
    fn extract_items(&self, body: &str, base: &Url) -> Vec<FetchedItem> {
        let doc = Html::parse_document(body);
        let block_sel = Selector::parse("article.news-item").unwrap();
        let link_sel = Selector::parse("h4.title a").unwrap();

        let mut items = Vec::new();
        for block in doc.select(&block_sel) {
            let Some(link) = block.select(&link_sel).next() else {
                continue;
            };
            let Some(title) = headline(link) else {
                continue;
            };

            items.push(FetchedItem {
                title,
                url: resolve_href(base, link.value().attr("href")),
                author: Some(CAMARA_AUTHOR.to_string()),
            });
        }

        items
    }

    fn name(&self) -> &str {
        "camara"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
<html><body>
  <section class="news-list">
    <article class="news-item">
      <span class="date">20/10/2025</span>
      <h4 class="title"><a href="/comunicacao/noticias/2025/10/sessao-solene">Sessão solene homenageia
         professores da rede municipal</a></h4>
    </article>
    <article class="news-item">
      <h4 class="title"><a href="/comunicacao/noticias/2025/10/vazia">   </a></h4>
    </article>
    <article class="news-item">
      <p>Bloco sem título</p>
    </article>
    <article class="news-item">
      <h4 class="title"><a href="https://www.recife.pe.leg.br/comunicacao/noticias/2025/10/lei">Vereadores aprovam lei de acessibilidade</a></h4>
    </article>
  </section>
</body></html>
"#;

    fn base() -> Url {
        Url::parse("https://www.recife.pe.leg.br/comunicacao/noticias").unwrap()
    }

    #[test]
    fn extracts_items_in_document_order() {
        let items = CamaraAdapter.extract_items(LISTING, &base());

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].title,
            "Sessão solene homenageia professores da rede municipal"
        );
        assert_eq!(
            items[0].url.as_deref(),
            Some("https://www.recife.pe.leg.br/comunicacao/noticias/2025/10/sessao-solene")
        );
        assert_eq!(items[0].author.as_deref(), Some(CAMARA_AUTHOR));
        assert_eq!(items[1].title, "Vereadores aprovam lei de acessibilidade");
    }

    #[test]
    fn other_layouts_yield_nothing() {
        let other = r#"<div class="box-last-news"><h3><a href="/x">T</a></h3></div>"#;
        assert!(CamaraAdapter.extract_items(other, &base()).is_empty());
    }
}
