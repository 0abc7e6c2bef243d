use std::{collections::HashMap, net::IpAddr, path::PathBuf};

use anyhow::Result;
use rocket::{
    config::LogLevel,
    form::Form,
    get,
    http::Status,
    post,
    response::{content::RawHtml, Redirect},
    routes, uri, Build, Config, Responder, Rocket, State,
};

use super::html;
use super::processor::{apply_updates, process_form};
use super::schema::{read_form_doc, FormDoc, ValidationError, FORM_DOC_PATH};

struct ServerState {
    beancount_dir: PathBuf,
}

#[derive(Responder)]
enum Page {
    Html(RawHtml<String>),
    Redirect(Redirect),
}

type LoadedDoc = Option<Result<FormDoc, Vec<ValidationError>>>;

impl ServerState {
    /// The document is read on every request so edits show up without a restart
    fn load(&self) -> Result<LoadedDoc, Status> {
        read_form_doc(&self.beancount_dir.join(FORM_DOC_PATH)).map_err(|err| {
            log::error!("{err:#}");
            Status::InternalServerError
        })
    }

    fn load_valid(&self) -> Result<FormDoc, Status> {
        match self.load()? {
            Some(Ok(doc)) => Ok(doc),
            _ => Err(Status::NotFound),
        }
    }
}

pub fn app(config: Config, beancount_dir: PathBuf) -> Rocket<Build> {
    rocket::custom(config)
        .manage(ServerState { beancount_dir })
        .mount("/", routes![home, form_doc_errors, show_form, submit_form])
}

pub async fn serve(host: IpAddr, port: u16, beancount_dir: PathBuf) -> Result<()> {
    let server = app(
        Config {
            log_level: LogLevel::Critical,
            address: host,
            port,
            ..Default::default()
        },
        beancount_dir,
    )
    .ignite()
    .await?;
    log::info!(
        "Serving forms at {}",
        console::style(format!("http://{host}:{port}")).green()
    );
    server.launch().await?;
    Ok(())
}

#[get("/")]
fn home(state: &State<ServerState>) -> Result<Page, Status> {
    match state.load()? {
        None => Ok(Page::Html(RawHtml(html::home_page(None)))),
        Some(Err(_)) => Ok(Page::Redirect(Redirect::found(uri!(form_doc_errors)))),
        Some(Ok(doc)) => Ok(Page::Html(RawHtml(html::home_page(Some(&doc))))),
    }
}

#[get("/errors")]
fn form_doc_errors(state: &State<ServerState>) -> Result<RawHtml<String>, Status> {
    let errors = match state.load()? {
        Some(Err(errors)) => errors,
        _ => Vec::new(),
    };
    Ok(RawHtml(html::errors_page(&errors)))
}

#[get("/form/<name>")]
fn show_form(name: &str, state: &State<ServerState>) -> Result<RawHtml<String>, Status> {
    let doc = state.load_valid()?;
    let schema = doc
        .forms
        .iter()
        .find(|form| form.name == name)
        .ok_or(Status::NotFound)?;
    Ok(RawHtml(html::form_page(schema, &HashMap::new(), &[], None)))
}

#[post("/form/<name>", data = "<form_data>")]
fn submit_form(
    name: &str,
    form_data: Form<HashMap<String, String>>,
    state: &State<ServerState>,
) -> Result<RawHtml<String>, Status> {
    let doc = state.load_valid()?;
    let schema = doc
        .forms
        .iter()
        .find(|form| form.name == name)
        .ok_or(Status::NotFound)?;
    let form_data = form_data.into_inner();

    log::info!("Processing form {} ...", schema.name);
    let result = process_form(schema, &form_data, &state.beancount_dir).and_then(|updates| {
        apply_updates(&updates).map_err(|err| vec![format!("{err:#}")])
    });
    let page = match result {
        Ok(_) => html::form_page(
            schema,
            &HashMap::new(),
            &[],
            Some("Submitted form successfully"),
        ),
        Err(errors) => html::form_page(schema, &form_data, &errors, None),
    };
    Ok(RawHtml(page))
}
