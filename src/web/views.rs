use askama::Template;
use askama_web::WebTemplate;

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub(crate) struct IndexTemplate {
    pub(crate) user_prompt: String,
    pub(crate) meme_count: u32,
}

#[derive(Template, WebTemplate)]
#[template(path = "result.html")]
pub(crate) struct ResultTemplate {
    pub(crate) current_meme: String,
    pub(crate) position: usize,
    pub(crate) total: usize,
    pub(crate) user_prompt: String,
    pub(crate) prev_url: String,
    pub(crate) next_url: String,
    pub(crate) download_url: String,
    pub(crate) again_url: String,
}
