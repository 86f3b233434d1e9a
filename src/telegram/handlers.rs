//! Telegram bot handler tree
//!
//! The same schema is used in production and in integration tests. Three
//! branches: photo messages carrying an `absen` caption, slash commands,
//! and inline keyboard callbacks.

use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::Utc;
use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::InputFile;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::core::utils::{format_ddmmyyyy, format_rupiah, slugify_name};
use crate::invoice::{AssetResolver, GeneratedInvoice, InvoiceService};
use crate::storage::{AttendanceRecord, AttendanceRepo, ObjectStore};
use crate::telegram::commands::{is_absen_caption, parse_absen_caption, Command, ABSEN_USAGE};
use crate::telegram::menu;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub repo: AttendanceRepo,
    pub invoices: Arc<InvoiceService>,
    pub resolver: AssetResolver,
    pub store: Option<ObjectStore>,
}

impl HandlerDeps {
    pub fn new(
        repo: AttendanceRepo,
        invoices: Arc<InvoiceService>,
        resolver: AssetResolver,
        store: Option<ObjectStore>,
    ) -> Self {
        Self {
            repo,
            invoices,
            resolver,
            store,
        }
    }
}

/// The complete handler tree for the bot.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_photo = deps.clone();
    let deps_commands = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // Photo ingestion must run before the command branch so captions
        // are never mistaken for commands
        .branch(photo_handler(deps_photo))
        .branch(command_handler(deps_commands))
        .branch(callback_handler(deps_callback))
}

/// Handler for photo messages with an `absen` caption.
fn photo_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| {
            msg.photo().is_some()
                && msg.caption().map(is_absen_caption).unwrap_or(false)
        })
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let caption = msg.caption().unwrap_or_default().to_string();
                if let Err(e) = handle_absen_photo(&bot, &msg, &caption, &deps).await {
                    log::error!("absen ingestion failed: {}", e);
                    let _ = bot.send_message(msg.chat.id, e.user_message()).await;
                }
                Ok(())
            }
        })
}

/// Handler for bot commands.
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command: {:?} from chat {}", cmd, msg.chat.id);
                let result = match cmd {
                    Command::Start | Command::Menu => send_main_menu(&bot, msg.chat.id).await,
                    Command::Help => {
                        bot.send_message(msg.chat.id, menu::HELP_TEXT).await?;
                        Ok(())
                    }
                    Command::Invoice(nama) => {
                        if nama.trim().is_empty() {
                            bot.send_message(msg.chat.id, "Pakai: /invoice <nama>").await?;
                            Ok(())
                        } else {
                            send_invoice_for(&bot, msg.chat.id, nama.trim(), &deps).await
                        }
                    }
                    Command::Belumbayar => send_overdue_report(&bot, msg.chat.id, &deps).await,
                    Command::Cekmurid(nama) => {
                        if nama.trim().is_empty() {
                            bot.send_message(msg.chat.id, "Pakai: /cekmurid <nama>").await?;
                            Ok(())
                        } else {
                            send_student_report(&bot, msg.chat.id, nama.trim(), &deps).await
                        }
                    }
                    Command::Hapusabsen(id) => {
                        handle_hapus(&bot, msg.chat.id, id.trim(), &deps).await
                    }
                };
                if let Err(e) = result {
                    log::error!("Command failed: {}", e);
                    let _ = bot.send_message(msg.chat.id, e.user_message()).await;
                }
                Ok(())
            }
        },
    ))
}

/// Handler for inline keyboard callbacks.
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            let _ = bot.answer_callback_query(q.id.clone()).await;
            let Some(data) = q.data else { return Ok(()) };
            let Some(chat_id) = q.message.as_ref().map(|m| m.chat().id) else {
                return Ok(());
            };

            let result = dispatch_callback(&bot, chat_id, &data, &deps).await;
            if let Err(e) = result {
                log::error!("Callback {} failed: {}", data, e);
                let _ = bot.send_message(chat_id, e.user_message()).await;
            }
            Ok(())
        }
    })
}

async fn dispatch_callback(
    bot: &Bot,
    chat_id: ChatId,
    data: &str,
    deps: &HandlerDeps,
) -> AppResult<()> {
    if let Some(nama) = data.strip_prefix("cekmurid_") {
        return send_student_report(bot, chat_id, nama, deps).await;
    }
    if let Some(nama) = data.strip_prefix("invoice_") {
        return send_invoice_for(bot, chat_id, nama, deps).await;
    }
    match data {
        "menu_main" => send_main_menu(bot, chat_id).await,
        "menu_help" => {
            bot.send_message(chat_id, menu::HELP_TEXT).await?;
            Ok(())
        }
        "menu_belumbayar" => send_overdue_report(bot, chat_id, deps).await,
        "menu_cekmurid" => {
            let names = deps.repo.distinct_names().await?;
            if names.is_empty() {
                bot.send_message(chat_id, "Belum ada data absen.").await?;
                return Ok(());
            }
            bot.send_message(chat_id, "🔍 Pilih murid:")
                .reply_markup(menu::student_keyboard(&names, "cekmurid_"))
                .await?;
            Ok(())
        }
        "menu_invoice" => {
            let names = deps.repo.distinct_uninvoiced_names().await?;
            if names.is_empty() {
                bot.send_message(chat_id, "Semua absen sudah di-invoice. 🎉")
                    .await?;
                return Ok(());
            }
            bot.send_message(chat_id, "🧾 Pilih murid untuk dibuatkan invoice:")
                .reply_markup(menu::student_keyboard(&names, "invoice_"))
                .await?;
            Ok(())
        }
        other => {
            log::warn!("Unknown callback: {}", other);
            Ok(())
        }
    }
}

async fn send_main_menu(bot: &Bot, chat_id: ChatId) -> AppResult<()> {
    bot.send_message(chat_id, menu::MAIN_MENU_TEXT)
        .parse_mode(teloxide::types::ParseMode::Markdown)
        .reply_markup(menu::main_menu_keyboard())
        .await?;
    Ok(())
}

/// Ingest one attendance photo: parse the caption, store the photo, insert
/// the record, and auto-invoice when the student reaches the threshold.
async fn handle_absen_photo(
    bot: &Bot,
    msg: &Message,
    caption: &str,
    deps: &HandlerDeps,
) -> AppResult<()> {
    let entry = match parse_absen_caption(caption) {
        Ok(entry) => entry,
        Err(e) => {
            bot.send_message(msg.chat.id, e.user_message()).await?;
            return Ok(());
        }
    };

    let photo = msg
        .photo()
        .and_then(|sizes| sizes.iter().max_by_key(|p| p.width * p.height))
        .ok_or_else(|| AppError::Validation(ABSEN_USAGE.to_string()))?;

    let file = bot.get_file(photo.file.id.clone()).await?;
    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        config::BOT_TOKEN.as_str(),
        file.path
    );
    let data = deps
        .resolver
        .http()
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?
        .to_vec();

    let filename = format!(
        "{}_{}_{}.jpg",
        slugify_name(&entry.nama),
        entry.tanggal.format("%d-%m-%Y"),
        Utc::now().format("%H%M%S")
    );
    let foto_path = store_photo(deps, &filename, data).await?;

    let record = AttendanceRecord {
        id: None,
        nama: entry.nama.clone(),
        harga: entry.harga,
        tanggal: entry.tanggal,
        deskripsi: entry.deskripsi.clone(),
        foto_path,
        is_invoiced: false,
        created_at: Utc::now(),
    };
    deps.repo.insert(&record).await?;

    let uninvoiced = deps.repo.find_uninvoiced_for_student(&entry.nama).await?;
    bot.send_message(
        msg.chat.id,
        format!(
            "✅ Absen tercatat!\n\n👤 {}\n💰 {}\n📅 {}\n📝 {}\n\n📊 Absen belum di-invoice: {}",
            entry.nama,
            format_rupiah(entry.harga),
            format_ddmmyyyy(&entry.tanggal),
            entry.deskripsi,
            uninvoiced.len()
        ),
    )
    .await?;

    // Fires exactly when the student reaches the threshold; a 5th entry on
    // top of an unresolved backlog does not re-trigger
    if uninvoiced.len() == config::rules::AUTO_INVOICE_THRESHOLD {
        log::info!(
            "{} reached {} uninvoiced entries, generating invoice",
            entry.nama,
            uninvoiced.len()
        );
        bot.send_message(msg.chat.id, "🧾 Sudah 4 absen, membuat invoice otomatis...")
            .await?;
        match deps.invoices.generate_for_student(&entry.nama).await {
            Ok(generated) => send_generated_invoice(bot, msg.chat.id, &generated).await?,
            Err(e) => {
                log::error!("Auto-invoice for {} failed: {}", entry.nama, e);
                bot.send_message(msg.chat.id, e.user_message()).await?;
            }
        }
    }
    Ok(())
}

/// Store the photo in R2, falling back to the local absen directory when
/// the upload fails or R2 is not configured. Returns the ref string that
/// goes into the record.
async fn store_photo(deps: &HandlerDeps, filename: &str, data: Vec<u8>) -> AppResult<String> {
    let key = format!("absen/{}", filename);
    if let Some(store) = &deps.store {
        match store.upload(data.clone(), &key, "image/jpeg").await {
            Ok(stored) => return Ok(stored),
            Err(e) => log::warn!("Photo upload failed, keeping local copy: {}", e),
        }
    }
    let dir = std::path::Path::new(config::ABSEN_DIR.as_str());
    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    std::fs::write(&path, data)?;
    Ok(path.to_string_lossy().into_owned())
}

async fn send_invoice_for(
    bot: &Bot,
    chat_id: ChatId,
    nama: &str,
    deps: &HandlerDeps,
) -> AppResult<()> {
    match deps.invoices.generate_for_student(nama).await {
        Ok(generated) => send_generated_invoice(bot, chat_id, &generated).await,
        Err(AppError::NotFound(_)) => {
            bot.send_message(
                chat_id,
                format!("Tidak ada absen baru untuk {} yang bisa di-invoice.", nama),
            )
            .await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn send_generated_invoice(
    bot: &Bot,
    chat_id: ChatId,
    generated: &GeneratedInvoice,
) -> AppResult<()> {
    let photo = InputFile::memory(generated.png.clone()).file_name(generated.filename.clone());
    bot.send_photo(chat_id, photo)
        .caption(format!(
            "🧾 Invoice {}\n📊 {} absen\n💰 Total: {}",
            generated.nama,
            generated.record_count,
            format_rupiah(generated.total)
        ))
        .await?;
    Ok(())
}

async fn send_overdue_report(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> AppResult<()> {
    let overdue = deps.repo.overdue_students(Utc::now()).await?;
    if overdue.is_empty() {
        bot.send_message(chat_id, "✅ Tidak ada murid yang menunggak.")
            .reply_markup(menu::back_keyboard())
            .await?;
        return Ok(());
    }

    let mut text = String::from("⏰ Murid yang belum bayar:\n");
    for student in &overdue {
        text.push_str(&format!(
            "\n👤 {}\n   {} absen, {} \n   Terakhir {} ({} hari lalu)\n",
            student.nama,
            student.uninvoiced_count,
            format_rupiah(student.total_unpaid),
            format_ddmmyyyy(&student.last_attendance),
            student.days_idle
        ));
    }
    bot.send_message(chat_id, text)
        .reply_markup(menu::back_keyboard())
        .await?;
    Ok(())
}

async fn send_student_report(
    bot: &Bot,
    chat_id: ChatId,
    nama: &str,
    deps: &HandlerDeps,
) -> AppResult<()> {
    let records = deps.repo.find_for_student_newest_first(nama).await?;
    if records.is_empty() {
        bot.send_message(chat_id, format!("Tidak ada absen untuk {}.", nama))
            .await?;
        return Ok(());
    }

    let total: i64 = records.iter().map(|r| r.harga).sum();
    let uninvoiced = records.iter().filter(|r| !r.is_invoiced).count();
    let mut text = format!(
        "🔍 {}\n📊 Total absen: {}\n🧾 Belum di-invoice: {}\n💰 Total: {}\n\nTerbaru:",
        records[0].nama,
        records.len(),
        uninvoiced,
        format_rupiah(total)
    );
    for record in records.iter().take(5) {
        text.push_str(&format!(
            "\n• {} | {} | {} {}",
            format_ddmmyyyy(&record.tanggal),
            record.deskripsi,
            format_rupiah(record.harga),
            if record.is_invoiced { "✅" } else { "⏳" }
        ));
    }
    bot.send_message(chat_id, text)
        .reply_markup(menu::back_keyboard())
        .await?;
    Ok(())
}

async fn handle_hapus(bot: &Bot, chat_id: ChatId, id: &str, deps: &HandlerDeps) -> AppResult<()> {
    if id.is_empty() {
        bot.send_message(chat_id, "Pakai: /hapusabsen <id>").await?;
        return Ok(());
    }
    let oid = ObjectId::parse_str(id)
        .map_err(|_| AppError::Validation(format!("ID tidak valid: {}", id)))?;

    match deps.repo.delete_by_id(&oid).await? {
        Some(record) => {
            // photo cleanup is best effort, the record is already gone
            if let Some(store) = &deps.store {
                store.delete(&record.photo_ref()).await;
            }
            if let Some(path) = record.photo_ref().local_path() {
                let _ = std::fs::remove_file(path);
            }
            bot.send_message(
                chat_id,
                format!(
                    "🗑 Absen dihapus: {} | {} | {}",
                    record.nama,
                    format_ddmmyyyy(&record.tanggal),
                    format_rupiah(record.harga)
                ),
            )
            .await?;
        }
        None => {
            bot.send_message(chat_id, format!("Absen {} tidak ditemukan.", id))
                .await?;
        }
    }
    Ok(())
}
