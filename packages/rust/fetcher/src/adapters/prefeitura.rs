//! Prefeitura do Recife news listing.

use enquete_shared::FetchedItem;
use scraper::{Html, Selector};
use url::Url;

use super::{PortalAdapter, clean_text, headline, resolve_href};

/// Extracts `.box-last-news` blocks: the `h3 a` link is the headline and the
/// `h5 a` label names the publishing department.
pub struct PrefeituraAdapter;

impl PortalAdapter for PrefeituraAdapter {
    fn extract_items(&self, body: &str, base: &Url) -> Vec<FetchedItem> {
        let doc = Html::parse_document(body);
        let block_sel = Selector::parse(".box-last-news").unwrap();
        let title_sel = Selector::parse("h3 a").unwrap();
        let author_sel = Selector::parse("h5 a").unwrap();

        let mut items = Vec::new();
        for block in doc.select(&block_sel) {
            let Some(link) = block.select(&title_sel).next() else {
                continue;
            };
            let Some(title) = headline(link) else {
                continue;
            };

            let author = block
                .select(&author_sel)
                .next()
                .map(clean_text)
                .filter(|a| !a.is_empty());

            items.push(FetchedItem {
                title,
                url: resolve_href(base, link.value().attr("href")),
                author,
            });
        }

        items
    }

    fn name(&self) -> &str {
        "prefeitura"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
<div class="row row-news-small">
  <div class="col-sm-6 col-md-6">
    <div class="box-last-news">
      <h5><a href="/noticias/20/10/2025/procon-recife-promove-semana-das-criancas">Procon Recife</a></h5>
      <h3><a href="/noticias/20/10/2025/procon-recife-promove-semana-das-criancas">Procon Recife promove Semana das Crianças com oficinas sobre consumo consciente na Rede Compaz</a></h3>
    </div>
  </div>
  <div class="col-sm-6 col-md-6">
    <div class="box-last-news">
      <h3><a href="/noticias/20/10/2025/sem-titulo"></a></h3>
    </div>
  </div>
  <div class="col-sm-6 col-md-6">
    <div class="box-last-news">
      <h5><a href="/noticias/20/10/2025/arena-go">Secretaria de Trabalho e Qualificação Profissional</a></h5>
      <h3><a href="/noticias/20/10/2025/arena-go-recife-promove-dois-dias-de-oportunidades">Arena GO Recife promove dois dias de oportunidades com foco em emprego, empreendedorismo e bem-estar</a></h3>
    </div>
  </div>
  <div class="col-sm-6 col-md-6">
    <div class="box-last-news">
      <h3><a href="/noticias/19/10/2025/sem-autor">Notícia sem secretaria</a></h3>
    </div>
  </div>
</div>
"#;

    fn base() -> Url {
        Url::parse("https://www2.recife.pe.gov.br/noticias").unwrap()
    }

    #[test]
    fn extracts_title_url_and_author() {
        let items = PrefeituraAdapter.extract_items(LISTING, &base());

        assert_eq!(items.len(), 3);

        assert_eq!(
            items[0].title,
            "Procon Recife promove Semana das Crianças com oficinas sobre consumo consciente na Rede Compaz"
        );
        assert_eq!(
            items[0].url.as_deref(),
            Some("https://www2.recife.pe.gov.br/noticias/20/10/2025/procon-recife-promove-semana-das-criancas")
        );
        assert_eq!(items[0].author.as_deref(), Some("Procon Recife"));

        assert_eq!(
            items[1].author.as_deref(),
            Some("Secretaria de Trabalho e Qualificação Profissional")
        );
        assert!(items[1].title.starts_with("Arena GO Recife"));

        assert_eq!(items[2].title, "Notícia sem secretaria");
        assert_eq!(items[2].author, None);
    }
}
